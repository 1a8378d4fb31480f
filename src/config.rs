// runtime configuration, built once at startup and passed down explicitly

use crate::core::Provider;
use clap::Args;
use std::num::NonZeroU32;
use std::path::PathBuf;

pub const DEFAULT_RESULT_LIMIT: NonZeroU32 = NonZeroU32::new(200).unwrap();

#[derive(Args, Debug, Clone)]
pub struct Config {
    /// row cap appended to every generated query
    #[arg(long, env = "RESULT_LIMIT", default_value_t = DEFAULT_RESULT_LIMIT, global = true)]
    pub result_limit: NonZeroU32,

    /// where uploaded .db files are stored
    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads", global = true)]
    pub upload_dir: PathBuf,

    /// ask the model for a short answer after running the query
    #[arg(long, env = "SUMMARIZE", global = true)]
    pub summarize: bool,

    #[command(flatten)]
    pub generator: GeneratorConfig,
}

#[derive(Args, Debug, Clone)]
pub struct GeneratorConfig {
    /// ai provider (ollama, claude, openai)
    #[arg(long, short = 'p', env = "LLM_PROVIDER", default_value = "ollama", global = true)]
    pub provider: Provider,

    /// model name, defaults to the provider's usual pick
    #[arg(long, env = "LLM_MODEL", global = true)]
    pub model: Option<String>,

    /// ollama endpoint
    #[arg(
        long,
        env = "OLLAMA_BASE_URL",
        default_value = "http://127.0.0.1:11434",
        global = true
    )]
    pub base_url: String,

    /// api key for hosted providers
    #[arg(long, short = 'k', env = "LLM_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// request timeout in seconds
    #[arg(long, env = "LLM_TIMEOUT", default_value_t = 60, global = true)]
    pub timeout_secs: u64,
}

impl GeneratorConfig {
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            result_limit: DEFAULT_RESULT_LIMIT,
            upload_dir: PathBuf::from("uploads"),
            summarize: false,
            generator: GeneratorConfig::default(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Ollama,
            model: None,
            base_url: "http://127.0.0.1:11434".to_string(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}
