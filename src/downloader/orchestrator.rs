// Download pipeline: resolve tools -> probe metadata -> download -> result

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command as TokioCommand;

use super::errors::DownloadError;
use super::models::{DownloadRequest, DownloadResult, MediaFormat, VideoInfo};
use super::parser::{final_path_candidate, parse_progress_percent};
use super::progress::ProgressEmitter;
use super::tools::{ToolLocator, ToolPaths};
use super::utils::{run_output_with_timeout, SegmentSplitter};

/// Stderr lines kept for the error message of a failed download
const STDERR_TAIL_LINES: usize = 20;

const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

pub struct Downloader {
    locator: ToolLocator,
    probe_timeout: Duration,
}

impl Downloader {
    pub fn new(locator: ToolLocator, probe_timeout: Duration) -> Self {
        Self {
            locator,
            probe_timeout,
        }
    }

    pub fn locator(&self) -> &ToolLocator {
        &self.locator
    }

    /// Run one download to completion.
    ///
    /// Progress percentages are pushed to `emitter` as yt-dlp prints them.
    /// Dropping the returned future kills the yt-dlp process.
    pub async fn download(
        &self,
        request: &DownloadRequest,
        emitter: &ProgressEmitter,
    ) -> Result<DownloadResult, DownloadError> {
        let tools = self.locator.resolve()?;
        tracing::info!(
            url = %request.url,
            format = %request.format,
            destination = %request.destination.display(),
            "starting download"
        );

        let info = self.probe(&tools.ytdlp, &request.url).await?;
        let title = info.display_title();
        tracing::info!(title = %title, ext = ?info.ext, "probed video");

        let captured = self.fetch(&tools, request, emitter).await?;

        let file_path = match captured {
            Some(path) => path,
            None => {
                let rebuilt = info.reconstruct_path(&request.destination, request.format);
                tracing::debug!(path = %rebuilt.display(), "no final path printed, rebuilt from title");
                rebuilt.to_string_lossy().into_owned()
            }
        };

        tracing::info!(file = %file_path, "download completed");
        Ok(DownloadResult {
            success: true,
            title,
            file_path,
        })
    }

    /// `yt-dlp <url> --dump-json` without downloading anything
    async fn probe(&self, ytdlp: &Path, url: &str) -> Result<VideoInfo, DownloadError> {
        let args = probe_args(url);
        tracing::debug!(args = ?args, "probing video info");

        let output = run_output_with_timeout(ytdlp, &args, self.probe_timeout)
            .await
            .map_err(|e| DownloadError::Probe(format!("failed to run yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DownloadError::Probe(format!(
                "yt-dlp exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        VideoInfo::parse(&stdout)
            .map_err(|e| DownloadError::Probe(format!("invalid JSON from yt-dlp: {e}")))
    }

    /// The real download. Returns the final path if yt-dlp printed one.
    async fn fetch(
        &self,
        tools: &ToolPaths,
        request: &DownloadRequest,
        emitter: &ProgressEmitter,
    ) -> Result<Option<String>, DownloadError> {
        let args = download_args(request, &tools.ffmpeg);
        tracing::info!(program = %tools.ytdlp.display(), args = ?args, "executing yt-dlp");

        let mut child = TokioCommand::new(&tools.ytdlp)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DownloadError::Download(format!("failed to start yt-dlp: {e}")))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::Download("stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::Download("stderr not captured".into()))?;

        let stderr_task = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            // Raw bytes, drained to EOF: yt-dlp may print non-UTF-8 text and
            // must never write into a closed pipe.
            let mut reader = BufReader::new(stderr);
            let mut raw = Vec::new();
            loop {
                raw.clear();
                match reader.read_until(b'\n', &mut raw).await {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(target: "tubegrab::ytdlp", error = %e, "stderr read failed");
                        break;
                    }
                }
                let line = String::from_utf8_lossy(&raw).trim_end().to_string();
                tracing::debug!(target: "tubegrab::ytdlp", "stderr: {line}");
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail
        });

        let destination = request.destination.to_string_lossy();
        let mut final_path: Option<String> = None;
        let mut splitter = SegmentSplitter::new();
        let mut buf = [0u8; 8192];

        loop {
            let n = stdout
                .read(&mut buf)
                .await
                .map_err(|e| DownloadError::Download(format!("failed to read yt-dlp output: {e}")))?;
            if n == 0 {
                break;
            }
            for segment in splitter.push(&buf[..n]) {
                handle_segment(&segment, &destination, emitter, &mut final_path);
            }
        }
        if let Some(rest) = splitter.finish() {
            handle_segment(&rest, &destination, emitter, &mut final_path);
        }

        let status = child
            .wait()
            .await
            .map_err(|e| DownloadError::Download(format!("failed to wait for yt-dlp: {e}")))?;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let detail = stderr_tail.into_iter().collect::<Vec<_>>().join("\n");
            tracing::warn!(%status, "yt-dlp failed");
            return Err(DownloadError::Download(if detail.is_empty() {
                format!("yt-dlp exited with {status}")
            } else {
                format!("yt-dlp exited with {status}: {detail}")
            }));
        }

        Ok(final_path)
    }
}

fn handle_segment(
    segment: &str,
    destination: &str,
    emitter: &ProgressEmitter,
    final_path: &mut Option<String>,
) {
    tracing::debug!(target: "tubegrab::ytdlp", "stdout: {segment}");

    if let Some(percent) = parse_progress_percent(segment) {
        emitter.emit(percent);
    }
    if let Some(path) = final_path_candidate(segment, destination) {
        *final_path = Some(path.to_string());
    }
}

pub(crate) fn probe_args(url: &str) -> Vec<OsString> {
    [url, "--dump-json", "--no-playlist", "--skip-download"]
        .into_iter()
        .map(OsString::from)
        .collect()
}

pub(crate) fn download_args(request: &DownloadRequest, ffmpeg: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        request.url.clone().into(),
        "-o".into(),
        request.destination.join(OUTPUT_TEMPLATE).into_os_string(),
        "--no-playlist".into(),
        "--ffmpeg-location".into(),
        ffmpeg.as_os_str().to_os_string(),
        "--no-update".into(),
        "--print".into(),
        "after_move:filepath".into(),
        "--encoding".into(),
        "utf-8".into(),
    ];

    let extra: &[&str] = match request.format {
        MediaFormat::Audio => &["-x", "--audio-format", "mp3", "--audio-quality", "0"],
        MediaFormat::Video => &[
            "-f",
            "bestvideo+bestaudio/best",
            "--merge-output-format",
            "mp4",
            "--embed-thumbnail",
        ],
    };
    args.extend(extra.iter().map(OsString::from));
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_probe_args() {
        assert_eq!(
            strings(&probe_args("https://youtu.be/abc")),
            vec!["https://youtu.be/abc", "--dump-json", "--no-playlist", "--skip-download"]
        );
    }

    #[test]
    fn test_video_args() {
        let request = DownloadRequest::new("https://youtu.be/abc", MediaFormat::Video, "/d");
        let args = strings(&download_args(&request, Path::new("/bin/ffmpeg")));
        assert_eq!(
            args,
            vec![
                "https://youtu.be/abc",
                "-o",
                "/d/%(title)s.%(ext)s",
                "--no-playlist",
                "--ffmpeg-location",
                "/bin/ffmpeg",
                "--no-update",
                "--print",
                "after_move:filepath",
                "--encoding",
                "utf-8",
                "-f",
                "bestvideo+bestaudio/best",
                "--merge-output-format",
                "mp4",
                "--embed-thumbnail",
            ]
        );
    }

    #[test]
    fn test_audio_args() {
        let request = DownloadRequest::new("https://youtu.be/abc", MediaFormat::Audio, "/d");
        let args = strings(&download_args(&request, Path::new("/bin/ffmpeg")));
        assert!(args.ends_with(&[
            "-x".to_string(),
            "--audio-format".to_string(),
            "mp3".to_string(),
            "--audio-quality".to_string(),
            "0".to_string(),
        ]));
        assert!(!args.iter().any(|a| a == "--embed-thumbnail"));
    }

    #[test]
    fn test_segment_handling() {
        let emitter = ProgressEmitter::new();
        let mut sub = emitter.subscribe();
        let mut final_path = None;

        handle_segment("[download]  12.5% of 3.00MiB", "/d", &emitter, &mut final_path);
        handle_segment("[info] Downloading webpage", "/d", &emitter, &mut final_path);
        handle_segment("/d/My Video.mp4", "/d", &emitter, &mut final_path);

        assert_eq!(sub.try_next(), Some(12.5));
        assert_eq!(sub.try_next(), None);
        assert_eq!(final_path.as_deref(), Some("/d/My Video.mp4"));
    }

    #[tokio::test]
    async fn test_missing_binary_fails_before_spawn() {
        let tmp = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(ToolLocator::new(tmp.path()), Duration::from_secs(5));
        let request = DownloadRequest::new(
            "https://www.youtube.com/watch?v=abc",
            MediaFormat::Video,
            PathBuf::from("/d"),
        );
        let err = downloader
            .download(&request, &ProgressEmitter::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::BinaryNotFound { .. }));
    }
}
