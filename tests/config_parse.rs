use acta_audit::config::Config;

#[test]
fn parse_example_config() {
    let raw = include_str!("../acta-audit.example.toml");
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    assert!(cfg.global.max_parallel_records >= 1);
    assert!(!cfg.paths.out_dir.is_empty());
    assert_eq!(cfg.sampling.size, 400);
    assert!(cfg.locator.url_template.contains("{entity}"));
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let cfg: Config = toml::from_str("[sampling]\nsize = 10\n").expect("parse TOML");
    assert_eq!(cfg.sampling.size, 10);
    assert_eq!(cfg.sampling.seed, 1);
    assert_eq!(cfg.global.max_parallel_records, 1);
    assert_eq!(cfg.extractor.max_tokens, 1500);
    assert_eq!(cfg.retry.max_attempts, 1);
}

#[test]
fn partial_sections_keep_unlisted_keys() {
    let raw = "[extractor]\nmodel = \"gpt-4o-mini\"\n\n[ocr]\ntimeout_seconds = 5\n\n[logging]\njson = true\n";
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    assert_eq!(cfg.extractor.model, "gpt-4o-mini");
    assert_eq!(cfg.extractor.max_tokens, 1500);
    assert_eq!(cfg.extractor.api_key_env, "OPENAI_API_KEY");
    assert_eq!(cfg.ocr.timeout_seconds, 5);
    assert_eq!(cfg.ocr.feature, "TEXT_DETECTION");
    assert!(cfg.logging.json);
}

#[test]
fn default_file_names() {
    let cfg = Config::default();
    assert_eq!(cfg.paths.dataset, "PRES_2024.csv_exported.csv");
    assert_eq!(cfg.paths.roster, "PRES_CANDIDATURAS_2024.csv");
    assert_eq!(cfg.output.report_filename, "resultados_verificacion.csv");
}
