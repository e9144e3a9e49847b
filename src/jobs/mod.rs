pub mod pipeline;

pub use pipeline::{run_job, EpisodeJob, ToolSet};

use crate::config::{Config, TitleLanguage};
use dubmerge_av::loudnorm::LoudnessTarget;
use dubmerge_av::plan::MergeParams;
use dubmerge_av::tools;

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Lifecycle of one episode job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Probing,
    Planning,
    Running,
    Finalizing,
    Done,
    Failed,
}

/// Final report for one episode job.
#[derive(Debug)]
pub struct JobOutcome {
    pub name: String,
    pub state: JobState,
    pub error: Option<String>,
}

/// Shared per-run log file, written by every worker.
#[derive(Clone, Default)]
pub struct LogSink(Option<Arc<Mutex<File>>>);

impl LogSink {
    pub fn open(dir: &std::path::Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {:?}", dir))?;
        let name = format!("dubmerge-{}.log", chrono::Local::now().format("%Y%m%d-%H%M%S"));
        let path = dir.join(name);
        let file =
            File::create(&path).with_context(|| format!("Failed to create log file: {:?}", path))?;
        tracing::info!("Writing run log to {:?}", path);
        Ok(Self(Some(Arc::new(Mutex::new(file)))))
    }

    pub fn disabled() -> Self {
        Self(None)
    }

    pub fn write(&self, message: &str) {
        if let Some(ref file) = self.0 {
            if let Ok(mut file) = file.lock() {
                let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
                let _ = writeln!(file, "{stamp} {message}");
            }
        }
    }
}

/// Run-time selection and overrides on top of the catalog.
#[derive(Debug, Default)]
pub struct RunOptions {
    pub season: Option<String>,
    pub episode: Option<String>,
    pub workers: Option<usize>,
    pub normalize: Option<bool>,
    pub log: bool,
    pub title_language: Option<TitleLanguage>,
}

/// Build the job list for the selected slice of the catalog.
pub fn build_jobs(config: &Config, opts: &RunOptions) -> Vec<EpisodeJob> {
    let normalize = opts.normalize.unwrap_or(config.normalize.enabled);
    let title_language = opts.title_language.unwrap_or(config.show.title_language);
    let loudness = LoudnessTarget {
        integrated: config.normalize.integrated,
        true_peak: config.normalize.true_peak,
        range: config.normalize.loudness_range,
    };

    let mut jobs = Vec::new();
    for season in &config.seasons {
        if let Some(ref filter) = opts.season {
            if !season.prefix.contains(filter.as_str()) {
                continue;
            }
        }

        // Validated at config load; an unparseable value never gets here.
        let audio_start = season
            .audio_start
            .as_deref()
            .and_then(dubmerge_av::probe::parse_tag_duration);

        let season_in = config.show.input_root.join(&season.path);
        let season_out = config.show.output_root.join(&season.path);
        let audio_dir = if config.show.audio_dir.is_empty() {
            season_in.clone()
        } else {
            season_in.join(&config.show.audio_dir)
        };

        for episode in &season.episodes {
            if let Some(ref filter) = opts.episode {
                if !episode.prefix.contains(filter.as_str()) {
                    continue;
                }
            }

            let title = match title_language {
                TitleLanguage::De => &episode.title_de,
                TitleLanguage::En => &episode.title_en,
            };
            let stem = format!(
                "{}{}{}{}",
                config.show.title_prefix, season.prefix, episode.prefix, title
            );

            jobs.push(EpisodeJob {
                name: format!("{}{}", season.prefix, episode.prefix),
                video_path: season_in.join(&episode.video),
                audio_path: audio_dir.join(&episode.audio),
                output_path: season_out.join(format!("{stem}.mkv")),
                title: stem,
                params: MergeParams {
                    normalize,
                    loudness,
                    sample_rate: config.normalize.sample_rate,
                    delay: Duration::from_millis(episode.delay_ms),
                    secondary_start: audio_start,
                    secondary_nominal_fps: season.nominal_fps,
                    primary_language: config.merge.primary_language.clone(),
                    secondary_language: config.merge.secondary_language.clone(),
                },
            });
        }
    }
    jobs
}

/// Resolve the external tools once, honoring config overrides.
pub fn resolve_tools(config: &Config) -> Result<ToolSet> {
    Ok(ToolSet {
        ffmpeg: tools::get_tool_path("ffmpeg", config.tools.ffmpeg.as_deref())?,
        ffprobe: tools::get_tool_path("ffprobe", config.tools.ffprobe.as_deref())?,
        mkvpropedit: tools::get_tool_path("mkvpropedit", config.tools.mkvpropedit.as_deref())?,
    })
}

/// Process every job with a bounded worker pool and collect the outcomes.
pub async fn run_all(config: &Config, opts: RunOptions) -> Result<Vec<JobOutcome>> {
    let jobs = build_jobs(config, &opts);
    if jobs.is_empty() {
        anyhow::bail!("No episodes match the given season/episode filters");
    }

    let tools = resolve_tools(config)?;

    let log = if opts.log || config.log.enabled {
        LogSink::open(&config.log.dir)?
    } else {
        LogSink::disabled()
    };

    let workers = opts.workers.unwrap_or(config.merge.workers).max(1);
    tracing::info!("Processing {} episode(s) with {} worker(s)", jobs.len(), workers);

    let semaphore = Arc::new(Semaphore::new(workers));
    let mut handles = Vec::new();

    for job in jobs {
        let semaphore = semaphore.clone();
        let tools = tools.clone();
        let log = log.clone();

        handles.push(tokio::spawn(async move {
            // Closed only on runtime shutdown.
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    return JobOutcome {
                        name: job.name,
                        state: JobState::Failed,
                        error: Some("worker pool shut down".to_string()),
                    }
                }
            };

            let name = job.name.clone();
            let result =
                tokio::task::spawn_blocking(move || run_job(&tools, &job, &log)).await;

            match result {
                Ok(Ok(())) => {
                    tracing::info!("{name}completed");
                    JobOutcome {
                        name,
                        state: JobState::Done,
                        error: None,
                    }
                }
                Ok(Err(e)) => {
                    tracing::error!("{name}failed: {e}");
                    JobOutcome {
                        name,
                        state: JobState::Failed,
                        error: Some(e.to_string()),
                    }
                }
                Err(e) => {
                    tracing::error!("{name}worker panicked: {e}");
                    JobOutcome {
                        name,
                        state: JobState::Failed,
                        error: Some(e.to_string()),
                    }
                }
            }
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await?);
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EpisodeConfig, SeasonConfig};
    use std::path::PathBuf;

    fn sample_config() -> Config {
        let mut config = Config::default();
        config.show.title_prefix = "The Expanse - ".to_string();
        config.show.input_root = PathBuf::from("/in");
        config.show.output_root = PathBuf::from("/out");
        config.show.audio_dir = "dub".to_string();
        config.seasons = vec![SeasonConfig {
            prefix: "S01E".to_string(),
            path: "Season 1".to_string(),
            nominal_fps: Some(25.0),
            audio_start: None,
            episodes: vec![
                EpisodeConfig {
                    prefix: "01 - ".to_string(),
                    video: "ep01.mkv".to_string(),
                    audio: "ep01.m4a".to_string(),
                    title_de: "Der Weckruf".to_string(),
                    title_en: "Dulcinea".to_string(),
                    delay_ms: 1500,
                },
                EpisodeConfig {
                    prefix: "02 - ".to_string(),
                    video: "ep02.mkv".to_string(),
                    audio: "ep02.m4a".to_string(),
                    title_de: "Das grosse Leere".to_string(),
                    title_en: "The Big Empty".to_string(),
                    delay_ms: 0,
                },
            ],
        }];
        config
    }

    #[test]
    fn test_build_jobs_resolves_paths_and_titles() {
        let config = sample_config();
        let jobs = build_jobs(&config, &RunOptions::default());
        assert_eq!(jobs.len(), 2);

        let job = &jobs[0];
        assert_eq!(job.name, "S01E01 - ");
        assert_eq!(job.video_path, PathBuf::from("/in/Season 1/ep01.mkv"));
        assert_eq!(job.audio_path, PathBuf::from("/in/Season 1/dub/ep01.m4a"));
        assert_eq!(
            job.output_path,
            PathBuf::from("/out/Season 1/The Expanse - S01E01 - Der Weckruf.mkv")
        );
        assert_eq!(job.title, "The Expanse - S01E01 - Der Weckruf");
        assert_eq!(job.params.delay, Duration::from_millis(1500));
        assert_eq!(job.params.secondary_nominal_fps, Some(25.0));
        assert_eq!(job.params.secondary_start, None);
    }

    #[test]
    fn test_audio_start_becomes_secondary_trim() {
        let mut config = sample_config();
        config.seasons[0].audio_start = Some("00:00:05.000".to_string());
        let jobs = build_jobs(&config, &RunOptions::default());
        assert_eq!(jobs[0].params.secondary_start, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_build_jobs_title_language() {
        let mut config = sample_config();
        config.show.title_language = TitleLanguage::En;
        let jobs = build_jobs(&config, &RunOptions::default());
        assert_eq!(jobs[0].title, "The Expanse - S01E01 - Dulcinea");

        // CLI override wins over the catalog setting.
        let opts = RunOptions {
            title_language: Some(TitleLanguage::De),
            ..Default::default()
        };
        let jobs = build_jobs(&config, &opts);
        assert_eq!(jobs[0].title, "The Expanse - S01E01 - Der Weckruf");
    }

    #[test]
    fn test_episode_filter() {
        let config = sample_config();
        let opts = RunOptions {
            episode: Some("02".to_string()),
            ..Default::default()
        };
        let jobs = build_jobs(&config, &opts);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, "S01E02 - ");
    }

    #[test]
    fn test_filters_match_by_substring() {
        let config = sample_config();

        // A bare number selects by containment, not by prefix.
        let opts = RunOptions {
            season: Some("1".to_string()),
            ..Default::default()
        };
        assert_eq!(build_jobs(&config, &opts).len(), 2);

        let opts = RunOptions {
            season: Some("01".to_string()),
            episode: Some("2".to_string()),
            ..Default::default()
        };
        let jobs = build_jobs(&config, &opts);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, "S01E02 - ");
    }

    #[test]
    fn test_season_filter_excludes_everything_on_mismatch() {
        let config = sample_config();
        let opts = RunOptions {
            season: Some("S02".to_string()),
            ..Default::default()
        };
        assert!(build_jobs(&config, &opts).is_empty());
    }

    #[test]
    fn test_normalize_override() {
        let config = sample_config();
        let opts = RunOptions {
            normalize: Some(true),
            ..Default::default()
        };
        let jobs = build_jobs(&config, &opts);
        assert!(jobs[0].params.normalize);
    }

    #[test]
    fn test_audio_next_to_video_when_audio_dir_empty() {
        let mut config = sample_config();
        config.show.audio_dir = String::new();
        let jobs = build_jobs(&config, &RunOptions::default());
        assert_eq!(jobs[0].audio_path, PathBuf::from("/in/Season 1/ep01.m4a"));
    }
}
