use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub dataset: Dataset,
    #[serde(default)]
    pub sampling: Sampling,
    #[serde(default)]
    pub locator: Locator,
    #[serde(default)]
    pub fetch: Fetch,
    #[serde(default)]
    pub ocr: Ocr,
    #[serde(default)]
    pub extractor: Extractor,
    #[serde(default)]
    pub retry: Retry,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    /// A stable, normalization-friendly string for hashing.
    pub fn normalized_for_hash(&self) -> String {
        toml::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Global {
    pub job_name: String,
    /// Records processed concurrently; also the bound on in-flight external calls.
    pub max_parallel_records: usize,
    pub stop_on_credentials_rejected: bool,
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            job_name: "pres-2024".into(),
            max_parallel_records: 1,
            stop_on_credentials_rejected: true,
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub out_dir: String,
    pub dataset: String,
    pub roster: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            out_dir: "out".into(),
            dataset: "PRES_2024.csv_exported.csv".into(),
            roster: "PRES_CANDIDATURAS_2024.csv".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub entity_column: String,
    pub section_column: String,
    pub delimiter: char,
}
impl Default for Dataset {
    fn default() -> Self {
        Self {
            entity_column: "ID_ENTIDAD".into(),
            section_column: "SECCION".into(),
            delimiter: ',',
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Sampling {
    pub size: usize,
    pub seed: u64,
}
impl Default for Sampling {
    fn default() -> Self {
        Self { size: 400, seed: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Locator {
    /// Lookup address; `{entity}` and `{section}` are substituted per record.
    pub url_template: String,
    pub timeout_seconds: u64,
}
impl Default for Locator {
    fn default() -> Self {
        Self {
            url_template:
                "https://prep.tec.mx/publicacion/nacional/assets/presidencia/entidad/{entity}_{section}.json"
                    .into(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Fetch {
    pub timeout_seconds: u64,
    pub max_document_bytes: u64,
}
impl Default for Fetch {
    fn default() -> Self {
        Self {
            timeout_seconds: 60,
            max_document_bytes: 20 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Ocr {
    pub endpoint: String,
    pub api_key_env: String,
    pub feature: String,
    pub timeout_seconds: u64,
}
impl Default for Ocr {
    fn default() -> Self {
        Self {
            endpoint: "https://vision.googleapis.com/v1/images:annotate".into(),
            api_key_env: "GOOGLE_VISION_API_KEY".into(),
            feature: "TEXT_DETECTION".into(),
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Extractor {
    pub base_url: String,
    pub model: String,
    pub instruction: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub api_key_env: String,
    pub timeout_seconds: u64,
}
impl Default for Extractor {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-3.5-turbo".into(),
            instruction: "Parsea la siguiente información de acta electoral:".into(),
            temperature: 0.7,
            max_tokens: 1500,
            api_key_env: "OPENAI_API_KEY".into(),
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Retry {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}
impl Default for Retry {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// 0 disables the deadline.
    pub run_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    pub report_filename: String,
    pub write_summary_json: bool,
    pub summary_filename: String,
    pub dump_effective_config: bool,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            report_filename: "resultados_verificacion.csv".into(),
            write_summary_json: true,
            summary_filename: "summary.json".into(),
            dump_effective_config: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}
