pub mod agent;
pub mod cli;
pub mod config;
pub mod console;
pub mod llm;
pub mod models;
pub mod reveal;
pub mod session;

use agent::MuminAgent;
use cli::Args;
use config::prompt::{ self, PromptConfig };
use config::settings::{ FileSettingsStore, SettingsStore, Tone };
use log::info;
use models::context::{ load_context, PromptContext };
use session::InMemorySessionRepository;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Base URL: {}", args.chat_base_url.as_deref().unwrap_or("adapter default"));
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("adapter default"));
    info!("Temperature: {}", args.temperature);
    info!("Max Tokens: {}", args.max_tokens);
    info!("History Window: {}", args.history_window);
    info!("History Cap: {}", args.history_cap);
    info!("Reveal Interval (ms): {}", args.reveal_interval_ms);
    info!("Settings Path: {}", args.settings_path);
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("built-in"));
    info!("Context Path: {}", args.context_path.as_deref().unwrap_or("none"));
    info!("-------------------------");

    let settings = Arc::new(FileSettingsStore::new(&args.settings_path));
    if let Some(tone) = &args.set_tone {
        let tone: Tone = tone.parse()?;
        if settings.update_tone(tone).await? {
            info!("Tone updated to {}", tone);
        }
    }
    info!("Reply tone: {}", settings.get_tone().await.unwrap_or_default());

    let user_id = match &args.user_id {
        Some(id) if !id.trim().is_empty() => id.clone(),
        _ => settings.get_or_create_user_id().await?,
    };

    let prompt_config = match &args.prompts_path {
        Some(path) => prompt::load_prompts(path)?,
        None => Arc::new(PromptConfig::builtin()?),
    };
    let context = match &args.context_path {
        Some(path) => load_context(path)?,
        None => PromptContext::None,
    };

    let sessions = Arc::new(InMemorySessionRepository::new(args.history_cap));
    let agent = MuminAgent::from_args(
        &args,
        settings,
        sessions,
        prompt_config,
        context,
        user_id
    ).await?;

    console::run_console(&agent, &args.bubble).await
}
