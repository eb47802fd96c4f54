use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Chat LLM Provider Args ---
    /// Type of completion endpoint (openai, proxy)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "openai")]
    pub chat_llm_type: String,

    /// Base URL of the completion endpoint. For openai the chat completions route is appended
    /// unless already present; for proxy this is the full function URL.
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// Bearer token for the completion endpoint
    #[arg(long, env = "CHAT_API_KEY", default_value = "", hide_env_values = true)]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., gpt-4.1)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    /// Sampling temperature sent with each request.
    #[arg(long, env = "CHAT_TEMPERATURE", default_value = "0.7")]
    pub temperature: f32,

    /// Upper bound on reply length in tokens.
    #[arg(long, env = "CHAT_MAX_TOKENS", default_value = "300")]
    pub max_tokens: u32,

    // --- Conversation Args ---
    /// Number of most recent turns sent along with each question.
    #[arg(long, env = "HISTORY_WINDOW", default_value = "3")]
    pub history_window: usize,

    /// Maximum turns kept per user; older turns are dropped first.
    #[arg(
        long,
        env = "HISTORY_CAP",
        default_value = "20",
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub history_cap: usize,

    /// Delay between revealed characters, in milliseconds.
    #[arg(long, env = "REVEAL_INTERVAL_MS", default_value = "5")]
    pub reveal_interval_ms: u64,

    /// Anonymous user id. Created and stored in the settings file when omitted.
    #[arg(long, env = "USER_ID")]
    pub user_id: Option<String>,

    // --- Settings & Prompt Args ---
    /// Path to the local settings file (tone, anonymous user id).
    #[arg(long, env = "SETTINGS_PATH", default_value = ".mumin/settings.json")]
    pub settings_path: String,

    /// Store a new reply register (light, heavy) before starting.
    #[arg(long, env = "SET_TONE")]
    pub set_tone: Option<String>,

    /// Optional prompt template file overriding the built-in persona and templates.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    /// Optional JSON file describing the page the conversation is about
    /// (sure_*, story_* or hadis_* fields).
    #[arg(long, env = "CONTEXT_PATH")]
    pub context_path: Option<String>,

    /// Greeting shown before the first question.
    #[arg(
        long,
        env = "BUBBLE",
        default_value = "Bu sure hakkında merak ettiğiniz bir şey var mı? Sorularınızı sorabilirsiniz!"
    )]
    pub bubble: String,

    // --- General App Args ---
    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_mobile_client() {
        let args = Args::try_parse_from(["mumin-ai"]).unwrap();
        assert_eq!(args.chat_llm_type, "openai");
        assert_eq!(args.history_window, 3);
        assert_eq!(args.history_cap, 20);
        assert_eq!(args.reveal_interval_ms, 5);
        assert_eq!(args.max_tokens, 300);
        assert!(args.prompts_path.is_none());
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "mumin-ai",
            "--chat-llm-type",
            "proxy",
            "--chat-base-url",
            "https://example.functions.supabase.co/mumin-chat",
            "--history-cap",
            "8",
            "--set-tone",
            "heavy",
        ]).unwrap();
        assert_eq!(args.chat_llm_type, "proxy");
        assert_eq!(args.history_cap, 8);
        assert_eq!(args.set_tone.as_deref(), Some("heavy"));
    }

    #[test]
    fn zero_history_cap_is_rejected() {
        assert!(Args::try_parse_from(["mumin-ai", "--history-cap", "0"]).is_err());
        let args = Args::try_parse_from(["mumin-ai", "--history-cap", "1"]).unwrap();
        assert_eq!(args.history_cap, 1);
    }
}
