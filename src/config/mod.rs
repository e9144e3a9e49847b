mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load the show catalog and pipeline settings from a TOML file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations if no explicit path is given.
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = ["./dubmerge.toml", "./config.toml"];

    for path_str in default_paths {
        let path = Path::new(path_str);
        if path.exists() {
            return load_config(path);
        }
    }

    anyhow::bail!("No config file found (tried {})", default_paths.join(", "))
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.merge.workers == 0 {
        anyhow::bail!("merge.workers cannot be 0");
    }

    if config.seasons.is_empty() {
        anyhow::bail!("Config defines no seasons");
    }

    for season in &config.seasons {
        if season.prefix.is_empty() {
            anyhow::bail!("A season is missing its prefix");
        }
        if let Some(fps) = season.nominal_fps {
            if fps <= 0.0 {
                anyhow::bail!("Season '{}' has a non-positive nominal fps", season.prefix);
            }
        }
        if let Some(ref start) = season.audio_start {
            if dubmerge_av::probe::parse_tag_duration(start).is_none() {
                anyhow::bail!(
                    "Season '{}' has an unparseable audio_start (expected HH:MM:SS.nnn): {:?}",
                    season.prefix,
                    start
                );
            }
        }
        for episode in &season.episodes {
            if episode.video.is_empty() || episode.audio.is_empty() {
                anyhow::bail!(
                    "Episode '{}{}' is missing a video or audio file name",
                    season.prefix,
                    episode.prefix
                );
            }
        }
    }

    if !config.show.input_root.as_os_str().is_empty() && !config.show.input_root.exists() {
        tracing::warn!("Input root does not exist: {:?}", config.show.input_root);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[show]
title_prefix = "The Expanse - "
input_root = "/media/in"
output_root = "/media/out"
audio_dir = "dub"
title_language = "en"

[merge]
workers = 4

[normalize]
enabled = true

[[season]]
prefix = "S01E"
path = "Season 1"
nominal_fps = 25.0

[[season.episode]]
prefix = "01 - "
video = "ep01.mkv"
audio = "ep01.m4a"
title_de = "Der Weckruf"
title_en = "Dulcinea"
delay_ms = 1500
"#;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_sample_config() {
        let file = write_config(SAMPLE);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.show.title_language, TitleLanguage::En);
        assert_eq!(config.merge.workers, 4);
        assert!(config.normalize.enabled);
        assert_eq!(config.normalize.integrated, -23.0);
        assert_eq!(config.seasons.len(), 1);

        let season = &config.seasons[0];
        assert_eq!(season.nominal_fps, Some(25.0));
        assert_eq!(season.episodes[0].delay_ms, 1500);
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let file = write_config(
            r#"
[[season]]
prefix = "S01E"
path = "Season 1"

[[season.episode]]
prefix = "01 - "
video = "a.mkv"
audio = "a.m4a"
title_de = "t"
title_en = "t"
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.merge.workers, 2);
        assert_eq!(config.merge.primary_language, "deu");
        assert!(!config.normalize.enabled);
        assert_eq!(config.seasons[0].episodes[0].delay_ms, 0);
    }

    #[test]
    fn test_audio_start_parsed_and_validated() {
        let file = write_config(&SAMPLE.replace(
            "nominal_fps = 25.0",
            "nominal_fps = 25.0\naudio_start = \"00:00:05.000\"",
        ));
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.seasons[0].audio_start.as_deref(), Some("00:00:05.000"));

        let file = write_config(&SAMPLE.replace(
            "nominal_fps = 25.0",
            "nominal_fps = 25.0\naudio_start = \"five seconds\"",
        ));
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let file = write_config(&SAMPLE.replace("workers = 4", "workers = 0"));
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_empty_catalog_rejected() {
        let file = write_config("[show]\ntitle_prefix = \"x\"\n");
        assert!(load_config(file.path()).is_err());
    }
}
