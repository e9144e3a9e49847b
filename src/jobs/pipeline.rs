use dubmerge_av::plan::{self, MergeParams};
use dubmerge_av::probe;
use dubmerge_av::progress::{FfmpegGrammar, ProgressTracker};
use dubmerge_av::{exec, metadata, Error, LoudnormStats};

use super::{JobState, LogSink};
use std::path::PathBuf;
use std::process::Command;

/// Everything needed to merge one episode, resolved from the catalog.
#[derive(Debug, Clone)]
pub struct EpisodeJob {
    /// Display name, e.g. "S01E01 - ".
    pub name: String,
    /// Primary file (video container).
    pub video_path: PathBuf,
    /// Secondary file (dubbed audio).
    pub audio_path: PathBuf,
    pub output_path: PathBuf,
    /// Container title written after the merge.
    pub title: String,
    pub params: MergeParams,
}

/// Resolved external tool paths shared by every job.
#[derive(Debug, Clone)]
pub struct ToolSet {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub mkvpropedit: PathBuf,
}

// Each external pass contributes a fixed span to the job's progress.
const UNITS_PER_PASS: u64 = 100;

/// Run one episode start to finish: probe both inputs, optionally measure
/// loudness, plan the merge, execute it, then patch the container title.
///
/// Blocking; meant to run on a blocking worker thread.
pub fn run_job(tools: &ToolSet, job: &EpisodeJob, log: &LogSink) -> Result<(), Error> {
    for path in [&job.video_path, &job.audio_path] {
        if !path.exists() {
            return Err(Error::file_not_found(path.clone()));
        }
    }

    set_state(job, log, JobState::Probing);
    let primary = probe::probe(&tools.ffprobe, &job.video_path)?;
    let secondary = probe::probe(&tools.ffprobe, &job.audio_path)?;

    // One span per ffmpeg pass plus one for the metadata patch.
    let passes: u64 = if job.params.normalize { 2 } else { 1 };
    let total_units = (passes + 1) * UNITS_PER_PASS;
    let mut base_units = 0;

    let analysis: Option<Vec<LoudnormStats>> = if job.params.normalize {
        set_state(job, log, JobState::Planning);
        let args = plan::analysis_args(&primary, &secondary, &job.params);
        let mut command = Command::new(&tools.ffmpeg);
        command.args(&args);
        tracing::debug!("{}analysis: ffmpeg {}", job.name, args.join(" "));

        let mut grammar = FfmpegGrammar::new();
        let mut tracker = pass_tracker(job, base_units, total_units);
        let result = exec::run(command, &mut grammar, &mut tracker)?;
        base_units += UNITS_PER_PASS;
        if !result.success() {
            return Err(Error::tool_failed(
                "ffmpeg",
                format!("loudness analysis exited with code {}", result.exit_code),
            ));
        }
        Some(result.analysis)
    } else {
        set_state(job, log, JobState::Planning);
        None
    };

    let merge_plan = plan::plan(&primary, &secondary, &job.params, analysis.as_deref())?;

    if !merge_plan.dynamic_streams.is_empty() {
        let msg = format!(
            "{}streams {:?} fell back to dynamic normalization",
            job.name, merge_plan.dynamic_streams
        );
        tracing::warn!("{msg}");
        log.write(&msg);
    }

    if let Some(parent) = job.output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    set_state(job, log, JobState::Running);
    let args = plan::merge_args(&merge_plan, &primary, &secondary, &job.output_path);
    let mut command = Command::new(&tools.ffmpeg);
    command.args(&args);
    tracing::debug!("{}merge: ffmpeg {}", job.name, args.join(" "));

    let mut grammar = FfmpegGrammar::new();
    let mut tracker = pass_tracker(job, base_units, total_units);
    let result = exec::run(command, &mut grammar, &mut tracker)?;
    base_units += UNITS_PER_PASS;
    if !result.success() {
        return Err(Error::tool_failed(
            "ffmpeg",
            format!("merge exited with code {}", result.exit_code),
        ));
    }

    set_state(job, log, JobState::Finalizing);
    let mut tracker = pass_tracker(job, base_units, total_units);
    let result = metadata::set_title(&tools.mkvpropedit, &job.output_path, &job.title, &mut tracker)?;
    if !result.success() {
        return Err(Error::tool_failed(
            "mkvpropedit",
            format!("title patch exited with code {}", result.exit_code),
        ));
    }

    log.write(&format!("{}done: {:?}", job.name, job.output_path));
    Ok(())
}

/// Tracker for one pass, reporting progress against the whole job.
fn pass_tracker(job: &EpisodeJob, base_units: u64, total_units: u64) -> ProgressTracker {
    let name = job.name.clone();
    ProgressTracker::new(UNITS_PER_PASS).with_callback(Box::new(move |current, _| {
        let percent = ((base_units + current) * 100) / total_units;
        tracing::debug!("{name}{percent}%");
    }))
}

fn set_state(job: &EpisodeJob, log: &LogSink, state: JobState) {
    tracing::info!("{}{:?}", job.name, state);
    log.write(&format!("{}{:?}", job.name, state));
}
