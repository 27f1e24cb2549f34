//! Runs the download pipeline against fake `yt-dlp` shell scripts.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::Mutex;

use tubegrab_lib::commands::App;
use tubegrab_lib::downloader::{
    DownloadError, DownloadRequest, Downloader, MediaFormat, ProgressEmitter, ToolLocator,
    ToolType,
};
use tubegrab_lib::settings::MemoryStore;

// Writing an executable while another test forks can fail with ETXTBSY.
static SERIAL: Mutex<()> = Mutex::const_new(());

const PROBE_OK: &str = r#"{"title":"My Video","ext":"webm"}"#;

/// Bin dir with a `yt-dlp` that prints `probe` for `--dump-json` and runs
/// `download_body` otherwise. Every download invocation's args go to `args.txt`.
fn fake_ytdlp(probe: &str, download_body: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let args_file = dir.path().join("args.txt");
    let script = format!(
        r#"#!/bin/sh
for arg in "$@"; do
  if [ "$arg" = "--dump-json" ]; then
{probe}
  fi
done
printf '%s\n' "$@" > '{args}'
{download_body}
"#,
        probe = probe,
        args = args_file.display(),
        download_body = download_body,
    );

    let path = dir.path().join(ToolType::YtDlp.file_name());
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    dir
}

fn probe_prints(json: &str) -> String {
    format!("    printf '%s\\n' '{json}'\n    exit 0")
}

fn downloader(bin_dir: &Path) -> Downloader {
    Downloader::new(ToolLocator::new(bin_dir), Duration::from_secs(10))
}

fn recorded_args(bin_dir: &Path) -> Vec<String> {
    std::fs::read_to_string(bin_dir.join("args.txt"))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

fn drain(sub: &mut tubegrab_lib::downloader::ProgressSubscription) -> Vec<f64> {
    let mut seen = Vec::new();
    while let Some(v) = sub.try_next() {
        seen.push(v);
    }
    seen
}

#[tokio::test]
async fn test_end_to_end_success() {
    let _guard = SERIAL.lock().await;
    let bin = fake_ytdlp(
        &probe_prints(PROBE_OK),
        "echo '12.5%'\necho '/d/My Video.mp4'\nexit 0",
    );

    let emitter = ProgressEmitter::new();
    let mut sub = emitter.subscribe();
    let request = DownloadRequest::new(
        "https://www.youtube.com/watch?v=abc",
        MediaFormat::Video,
        "/d",
    );

    let result = downloader(bin.path())
        .download(&request, &emitter)
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.title, "My Video");
    assert_eq!(result.file_path, "/d/My Video.mp4");
    assert_eq!(drain(&mut sub), vec![12.5]);
}

#[tokio::test]
async fn test_download_failure_wraps_stderr() {
    let _guard = SERIAL.lock().await;
    let bin = fake_ytdlp(
        &probe_prints(PROBE_OK),
        "echo '3.0%'\necho 'ERROR: [youtube] abc: Video unavailable' >&2\nexit 1",
    );

    let app = App::new(MemoryStore::new("/d"), downloader(bin.path()));
    let request = DownloadRequest::new(
        "https://www.youtube.com/watch?v=abc",
        MediaFormat::Video,
        "/d",
    );

    let err = app.download(&request).await.unwrap_err();
    assert!(matches!(err, DownloadError::Download(_)), "got {err:?}");
    assert!(err.to_string().contains("Video unavailable"));
    assert!(app.get_settings().history.is_empty());
}

#[tokio::test]
async fn test_missing_binary_spawns_nothing() {
    let _guard = SERIAL.lock().await;
    let bin = tempfile::tempdir().unwrap();
    let request = DownloadRequest::new("https://youtu.be/abc", MediaFormat::Audio, "/d");

    let err = downloader(bin.path())
        .download(&request, &ProgressEmitter::new())
        .await
        .unwrap_err();

    match err {
        DownloadError::BinaryNotFound { path, .. } => {
            assert_eq!(path, bin.path().join(ToolType::YtDlp.file_name()));
        }
        other => panic!("expected BinaryNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_probe_exit_failure() {
    let _guard = SERIAL.lock().await;
    let bin = fake_ytdlp(
        "    echo 'ERROR: Unsupported URL' >&2\n    exit 2",
        "echo 'should not run'\nexit 0",
    );
    let request = DownloadRequest::new("https://youtu.be/abc", MediaFormat::Video, "/d");

    let err = downloader(bin.path())
        .download(&request, &ProgressEmitter::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::Probe(_)), "got {err:?}");
    assert!(err.to_string().contains("Unsupported URL"));
    assert!(!bin.path().join("args.txt").exists());
}

#[tokio::test]
async fn test_probe_garbage_output() {
    let _guard = SERIAL.lock().await;
    let bin = fake_ytdlp("    echo 'this is not json'\n    exit 0", "exit 0");
    let request = DownloadRequest::new("https://youtu.be/abc", MediaFormat::Video, "/d");

    let err = downloader(bin.path())
        .download(&request, &ProgressEmitter::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DownloadError::Probe(_)), "got {err:?}");
}

#[tokio::test]
async fn test_probe_timeout() {
    let _guard = SERIAL.lock().await;
    let bin = fake_ytdlp("    sleep 5\n    exit 0", "exit 0");
    let request = DownloadRequest::new("https://youtu.be/abc", MediaFormat::Video, "/d");

    let err = Downloader::new(ToolLocator::new(bin.path()), Duration::from_millis(200))
        .download(&request, &ProgressEmitter::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("timed out"), "got {err}");
}

#[tokio::test]
async fn test_audio_path_rebuilt_with_mp3() {
    let _guard = SERIAL.lock().await;
    let bin = fake_ytdlp(&probe_prints(PROBE_OK), "echo '[download] 45.0%'\nexit 0");
    let dest = tempfile::tempdir().unwrap();
    let request = DownloadRequest::new("https://youtu.be/abc", MediaFormat::Audio, dest.path());

    let result = downloader(bin.path())
        .download(&request, &ProgressEmitter::new())
        .await
        .unwrap();

    let expected: PathBuf = dest.path().join("My Video.mp3");
    assert_eq!(result.file_path, expected.to_string_lossy());
}

#[tokio::test]
async fn test_video_path_rebuilt_with_probed_ext() {
    let _guard = SERIAL.lock().await;
    let bin = fake_ytdlp(&probe_prints(r#"{"title":"Clip"}"#), "exit 0");
    let request = DownloadRequest::new("https://youtu.be/abc", MediaFormat::Video, "/d");

    let result = downloader(bin.path())
        .download(&request, &ProgressEmitter::new())
        .await
        .unwrap();
    assert_eq!(result.file_path, "/d/Clip.mp4");
}

#[tokio::test]
async fn test_download_arguments_reach_ytdlp() {
    let _guard = SERIAL.lock().await;
    let bin = fake_ytdlp(&probe_prints(PROBE_OK), "exit 0");
    let request = DownloadRequest::new("https://youtu.be/abc", MediaFormat::Audio, "/music");

    downloader(bin.path())
        .download(&request, &ProgressEmitter::new())
        .await
        .unwrap();

    let ffmpeg = bin.path().join(ToolType::Ffmpeg.file_name());
    let args = recorded_args(bin.path());
    assert_eq!(args[0], "https://youtu.be/abc");
    assert_eq!(args[1..3], ["-o".to_string(), "/music/%(title)s.%(ext)s".to_string()]);
    assert!(args.contains(&"--no-playlist".to_string()));
    assert!(args.contains(&"--no-update".to_string()));
    assert!(args.windows(2).any(|w| w[0] == "--ffmpeg-location" && w[1] == ffmpeg.to_string_lossy()));
    assert!(args.windows(2).any(|w| w[0] == "--print" && w[1] == "after_move:filepath"));
    assert!(args.windows(2).any(|w| w[0] == "--audio-format" && w[1] == "mp3"));
    assert!(args.contains(&"-x".to_string()));
}

#[tokio::test]
async fn test_progress_order_and_carriage_returns() {
    let _guard = SERIAL.lock().await;
    let bin = fake_ytdlp(
        &probe_prints(PROBE_OK),
        r"printf '[download]   1.5%%\r[download]   1.5%%\r[download]  60.2%%\n[download] 100%% done\n'
exit 0",
    );
    let emitter = ProgressEmitter::new();
    let mut sub = emitter.subscribe();
    let request = DownloadRequest::new("https://youtu.be/abc", MediaFormat::Video, "/d");

    downloader(bin.path()).download(&request, &emitter).await.unwrap();

    assert_eq!(drain(&mut sub), vec![1.5, 1.5, 60.2]);
}

#[tokio::test]
async fn test_last_destination_line_wins() {
    let _guard = SERIAL.lock().await;
    let bin = fake_ytdlp(
        &probe_prints(PROBE_OK),
        "echo '/d/My Video.f137.mp4'\necho '/d/My Video.mp4'\nexit 0",
    );
    let request = DownloadRequest::new("https://youtu.be/abc", MediaFormat::Video, "/d");

    let result = downloader(bin.path())
        .download(&request, &ProgressEmitter::new())
        .await
        .unwrap();
    assert_eq!(result.file_path, "/d/My Video.mp4");
}

#[tokio::test]
async fn test_successful_download_recorded_in_history() {
    let _guard = SERIAL.lock().await;
    let bin = fake_ytdlp(&probe_prints(PROBE_OK), "echo '/d/My Video.mp4'\nexit 0");
    let app = App::new(MemoryStore::new("/d"), downloader(bin.path()));
    let request = DownloadRequest::new("https://youtu.be/abc", MediaFormat::Video, "/d");

    let result = app.download(&request).await.unwrap();
    app.record_download(&request, &result).unwrap();

    let history = app.get_settings().history;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].title, "My Video");
    assert_eq!(history[0].file_path, "/d/My Video.mp4");
}

#[tokio::test]
async fn test_non_utf8_stderr_does_not_break_download() {
    let _guard = SERIAL.lock().await;
    let bin = fake_ytdlp(
        &probe_prints(PROBE_OK),
        r#"printf 'WARNING: \377\376 bad bytes\n' >&2
i=0
while [ $i -lt 2000 ]; do
  echo "WARNING: filler line $i" >&2
  i=$((i+1))
done
echo '/d/T.mp4'
exit 0"#,
    );
    let request = DownloadRequest::new("https://youtu.be/abc", MediaFormat::Video, "/d");

    let result = downloader(bin.path())
        .download(&request, &ProgressEmitter::new())
        .await
        .unwrap();
    assert_eq!(result.file_path, "/d/T.mp4");
}
