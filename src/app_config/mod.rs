use config::{Config, Environment, File, FileFormat};

pub const BACKEND_UPSTASH: &str = "upstash";
pub const BACKEND_SCYLLA: &str = "scylla";
pub const BACKEND_LOCAL: &str = "local";

#[derive(Debug, serde::Deserialize, Clone)]
pub struct Conf {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_site_dir")]
    pub site_dir: String,
    #[serde(default = "default_site_owner")]
    pub site_owner: String,
    #[serde(default)]
    pub track_root_only: bool,

    #[serde(default = "default_store_backend")]
    pub store_backend: String,
    #[serde(default = "default_visits_key")]
    pub visits_key: String,
    #[serde(default)]
    pub upstash_redis_rest_url: Option<String>,
    #[serde(default)]
    pub upstash_redis_rest_token: Option<String>,
    #[serde(default)]
    pub db_url: Option<String>,
    #[serde(default)]
    pub db_dc: Option<String>,
    #[serde(default = "default_schema_file")]
    pub schema_file: String,
    #[serde(default = "default_local_store_dir")]
    pub local_store_dir: String,

    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_chat_temperature")]
    pub chat_temperature: f32,
    #[serde(default = "default_chat_max_tokens")]
    pub chat_max_tokens: u32,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_site_dir() -> String {
    "site".to_string()
}

fn default_site_owner() -> String {
    "Paolo".to_string()
}

fn default_store_backend() -> String {
    BACKEND_UPSTASH.to_string()
}

fn default_visits_key() -> String {
    "visits".to_string()
}

fn default_schema_file() -> String {
    "schema.cql".to_string()
}

fn default_local_store_dir() -> String {
    "data".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o".to_string()
}

fn default_chat_temperature() -> f32 {
    0.7
}

fn default_chat_max_tokens() -> u32 {
    350
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

impl Conf {
    /// Checks that the credentials the selected backends need are present.
    /// Missing settings are deployment errors, so this runs before binding.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if is_blank(&self.openai_api_key) {
            anyhow::bail!("openai_api_key is required");
        }
        match self.store_backend.as_str() {
            BACKEND_UPSTASH => {
                if is_blank(&self.upstash_redis_rest_url) || is_blank(&self.upstash_redis_rest_token)
                {
                    anyhow::bail!(
                        "upstash backend requires upstash_redis_rest_url and upstash_redis_rest_token"
                    );
                }
            }
            BACKEND_SCYLLA => {
                if is_blank(&self.db_url) || is_blank(&self.db_dc) {
                    anyhow::bail!("scylla backend requires db_url and db_dc");
                }
            }
            BACKEND_LOCAL => {}
            other => anyhow::bail!("unknown store_backend: {}", other),
        }
        Ok(())
    }
}

pub struct AppConfig {
    conf: Config,
}

impl AppConfig {
    pub fn init() -> Self {
        Self {
            conf: Config::new(),
        }
    }
    pub fn from_env(mut self) -> Self {
        dotenv::dotenv().ok();
        if let Err(e) = self.conf.merge(Environment::new()) {
            panic!("Failed to load env: {:?}", e)
        }
        self
    }
    #[cfg(test)]
    pub fn from_file(mut self, filename: &str, file_format: FileFormat) -> Self {
        if let Err(e) = self.conf.merge(File::new(filename, file_format)) {
            panic!("Failed to load file {:?}: {:?}", filename, e);
        }
        self
    }
    /// Merges `filename` if it exists; a missing file is skipped.
    pub fn from_optional_file(mut self, filename: &str, file_format: FileFormat) -> Self {
        if let Err(e) = self
            .conf
            .merge(File::new(filename, file_format).required(false))
        {
            panic!("Failed to load file {:?}: {:?}", filename, e);
        }
        self
    }
    pub fn parse(self) -> Conf {
        match self.conf.try_into() {
            Ok(conf) => conf,
            Err(e) => {
                panic!("Failed to construct config: {:?}", e)
            }
        }
    }
}
