//! Encoder adapter: drives ffmpeg to produce one HLS rendition.

pub mod cmd;

use crate::domain::addressing::{parse_segment_name, segment_name, MANIFEST_NAME};
use crate::domain::hls::{Manifest, AUDIO_BITRATE_KBPS};
use crate::domain::ladder::LadderEntry;
use crate::ports::encoder::{EncodeError, Encoder, EncodingFailure};
use async_trait::async_trait;
use cmd::{EncodeCommand, TranscodeExecutor};
use std::ffi::OsString;
use std::io;
use std::path::Path;
use tokio::fs;

/// Target duration of every segment, in seconds.
pub const SEGMENT_SECONDS: u32 = 10;

/// Playlist ffmpeg writes; replaced by our own `index.m3u8` once verified.
const ENCODER_PLAYLIST: &str = ".encoder.m3u8";
const MANIFEST_TEMP: &str = ".index.m3u8.tmp";
const STDERR_TAIL_BYTES: usize = 4096;

pub struct FfmpegEncoder<E> {
    ffmpeg_bin: String,
    executor: E,
}

impl<E: TranscodeExecutor> FfmpegEncoder<E> {
    pub fn new(ffmpeg_bin: impl Into<String>, executor: E) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            executor,
        }
    }

    pub fn command(&self, source: &Path, entry: &LadderEntry, output_dir: &Path) -> EncodeCommand {
        let (w, h, b) = (entry.width, entry.height, entry.bitrate);
        let filter = format!(
            "scale=w={w}:h={h}:force_original_aspect_ratio=decrease,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1"
        );

        let maxrate = format!("{}k", b + b * 7 / 100);
        let bufsize = format!("{}k", b + b / 2);
        let bitrate = format!("{}k", b);
        let audio = format!("{}k", AUDIO_BITRATE_KBPS);
        let keyframes = format!("expr:gte(t,n_forced*{})", SEGMENT_SECONDS);
        let hls_time = SEGMENT_SECONDS.to_string();

        let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-y", "-i"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push(source.as_os_str().to_owned());

        let options: &[&str] = &[
            "-map", "0:v:0", "-map", "0:a:0?",
            "-vf", filter.as_str(),
            "-c:v", "libx264", "-preset", "medium", "-profile:v", "main",
            "-b:v", bitrate.as_str(), "-maxrate", maxrate.as_str(), "-bufsize", bufsize.as_str(),
            "-force_key_frames", keyframes.as_str(), "-sc_threshold", "0",
            "-c:a", "aac", "-b:a", audio.as_str(), "-ac", "2",
            "-map_metadata", "-1", "-fflags", "+bitexact",
            "-flags:v", "+bitexact", "-flags:a", "+bitexact",
            "-f", "hls", "-hls_time", hls_time.as_str(),
            "-hls_playlist_type", "vod", "-hls_flags", "independent_segments",
            "-hls_segment_filename",
        ];
        args.extend(options.iter().map(OsString::from));
        args.push(output_dir.join("segment_%03d.ts").into_os_string());
        args.push(output_dir.join(ENCODER_PLAYLIST).into_os_string());

        EncodeCommand {
            program: self.ffmpeg_bin.clone(),
            args,
            output_dir: output_dir.to_path_buf(),
        }
    }

    fn failure(entry: &LadderEntry, exit_code: Option<i32>, stderr: &[u8]) -> EncodeError {
        EncodeError::Failed(EncodingFailure {
            resolution: entry.name.clone(),
            exit_code,
            captured_stderr: stderr_tail(&String::from_utf8_lossy(stderr)),
        })
    }

    /// Check that the encoder playlist exists and every segment it names is
    /// present and non-empty, then rebuild our own manifest from it.
    async fn verify_outputs(
        entry: &LadderEntry,
        output_dir: &Path,
        exit_code: Option<i32>,
    ) -> Result<Manifest, EncodeError> {
        let playlist_path = output_dir.join(ENCODER_PLAYLIST);
        let text = match fs::read_to_string(&playlist_path).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Self::failure(entry, exit_code, b"encoder wrote no playlist"));
            }
            Err(e) => return Err(EncodeError::io(&playlist_path, e)),
        };

        let parsed = Manifest::parse(&text).map_err(|e| {
            Self::failure(entry, exit_code, format!("malformed playlist: {}", e).as_bytes())
        })?;

        for segment in &parsed.segments {
            let path = output_dir.join(segment_name(segment.index));
            match fs::metadata(&path).await {
                Ok(meta) if meta.is_file() && meta.len() > 0 => {}
                _ => {
                    let msg = format!("missing or empty {}", segment_name(segment.index));
                    return Err(Self::failure(entry, exit_code, msg.as_bytes()));
                }
            }
        }

        Ok(Manifest::vod(parsed.segments))
    }
}

#[async_trait]
impl<E: TranscodeExecutor> Encoder for FfmpegEncoder<E> {
    async fn encode(
        &self,
        source: &Path,
        entry: &LadderEntry,
        output_dir: &Path,
    ) -> Result<Manifest, EncodeError> {
        match fs::metadata(source).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(EncodeError::MissingSourceFile(source.to_path_buf())),
        }

        fs::create_dir_all(output_dir)
            .await
            .map_err(|e| EncodeError::io(output_dir, e))?;
        clear_outputs(output_dir)
            .await
            .map_err(|e| EncodeError::io(output_dir, e))?;

        let command = self.command(source, entry, output_dir);
        tracing::debug!(command = %command.display(), "running encoder");

        let output = match self.executor.run(&command).await {
            Ok(output) => output,
            Err(e) => return Err(Self::failure(entry, None, e.to_string().as_bytes())),
        };

        if !output.status.success() {
            return Err(Self::failure(entry, output.status.code(), &output.stderr));
        }

        let manifest = Self::verify_outputs(entry, output_dir, output.status.code()).await?;

        // Publish-last: the manifest appears only after every segment exists.
        let temp = output_dir.join(MANIFEST_TEMP);
        manifest
            .write_to(&temp)
            .await
            .map_err(|e| EncodeError::io(&temp, e))?;
        let target = output_dir.join(MANIFEST_NAME);
        fs::rename(&temp, &target)
            .await
            .map_err(|e| EncodeError::io(&target, e))?;
        let _ = fs::remove_file(output_dir.join(ENCODER_PLAYLIST)).await;

        Ok(manifest)
    }
}

/// Remove artifacts of a previous run so a re-encode never mixes outputs.
async fn clear_outputs(dir: &Path) -> io::Result<()> {
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let ours = parse_segment_name(&name).is_some()
            || name == MANIFEST_NAME
            || name == ENCODER_PLAYLIST
            || name == MANIFEST_TEMP;
        if ours && entry.file_type().await?.is_file() {
            fs::remove_file(entry.path()).await?;
        }
    }
    Ok(())
}

fn stderr_tail(stderr: &str) -> String {
    if stderr.len() <= STDERR_TAIL_BYTES {
        return stderr.to_string();
    }
    let mut start = stderr.len() - STDERR_TAIL_BYTES;
    while !stderr.is_char_boundary(start) {
        start += 1;
    }
    stderr[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::cmd::MockTranscodeExecutor;
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::{ExitStatus, Output};
    use tempfile::tempdir;

    fn create_mock_output(stderr: &str, code: i32) -> Output {
        Output {
            status: ExitStatus::from_raw(code << 8),
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    fn entry() -> LadderEntry {
        LadderEntry::new("720p", 1280, 720, 2800)
    }

    /// Writes what ffmpeg would: `count` segments and its own playlist.
    fn fake_ffmpeg(command: &EncodeCommand, count: u32) {
        let mut playlist = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n");
        for i in 0..count {
            let name = segment_name(i);
            std::fs::write(command.output_dir.join(&name), format!("ts-{}", i)).unwrap();
            playlist.push_str(&format!("#EXTINF:10.000000,\n{}\n", name));
        }
        playlist.push_str("#EXT-X-ENDLIST\n");
        std::fs::write(command.output_dir.join(ENCODER_PLAYLIST), playlist).unwrap();
    }

    fn source_in(dir: &Path) -> std::path::PathBuf {
        let source = dir.join("movie.mp4");
        std::fs::write(&source, b"source").unwrap();
        source
    }

    #[test]
    fn test_command_arguments() {
        let encoder = FfmpegEncoder::new("ffmpeg", MockTranscodeExecutor::new());
        let cmd = encoder.command(Path::new("/in/movie.mp4"), &entry(), Path::new("/out"));
        let args: Vec<String> = cmd.args.iter().map(|a| a.to_string_lossy().into_owned()).collect();

        assert_eq!(cmd.program, "ffmpeg");
        let after = |flag: &str| args[args.iter().position(|a| a == flag).unwrap() + 1].clone();
        assert_eq!(after("-i"), "/in/movie.mp4");
        assert_eq!(after("-b:v"), "2800k");
        assert_eq!(after("-maxrate"), "2996k");
        assert_eq!(after("-bufsize"), "4200k");
        assert_eq!(after("-hls_time"), "10");
        assert_eq!(after("-hls_segment_filename"), "/out/segment_%03d.ts");
        assert!(after("-vf").starts_with("scale=w=1280:h=720"));
        assert_eq!(args.last().unwrap(), "/out/.encoder.m3u8");
    }

    #[tokio::test]
    async fn test_encode_success_publishes_manifest_last() {
        let dir = tempdir().unwrap();
        let source = source_in(dir.path());
        let out = dir.path().join("stage");

        let mut executor = MockTranscodeExecutor::new();
        executor.expect_run().times(1).returning(|command| {
            assert!(!command.output_dir.join(MANIFEST_NAME).exists());
            fake_ffmpeg(command, 3);
            Ok(create_mock_output("", 0))
        });

        let encoder = FfmpegEncoder::new("ffmpeg", executor);
        let manifest = encoder.encode(&source, &entry(), &out).await.unwrap();

        assert_eq!(manifest.segments.len(), 3);
        let published = std::fs::read_to_string(out.join(MANIFEST_NAME)).unwrap();
        assert_eq!(published, manifest.render());
        assert!(published.contains("segment_002.ts"));
        assert!(!out.join(ENCODER_PLAYLIST).exists());
        assert!(!out.join(MANIFEST_TEMP).exists());
    }

    #[tokio::test]
    async fn test_missing_source_is_terminal_and_never_spawns() {
        let dir = tempdir().unwrap();
        let mut executor = MockTranscodeExecutor::new();
        executor.expect_run().times(0);

        let encoder = FfmpegEncoder::new("ffmpeg", executor);
        let err = encoder
            .encode(&dir.path().join("gone.mp4"), &entry(), &dir.path().join("o"))
            .await
            .unwrap_err();

        assert!(matches!(err, EncodeError::MissingSourceFile(_)));
        assert!(err.is_terminal());
    }

    #[tokio::test]
    async fn test_nonzero_exit_captures_stderr() {
        let dir = tempdir().unwrap();
        let source = source_in(dir.path());

        let mut executor = MockTranscodeExecutor::new();
        executor
            .expect_run()
            .returning(|_| Ok(create_mock_output("Invalid data found\n", 1)));

        let encoder = FfmpegEncoder::new("ffmpeg", executor);
        let err = encoder
            .encode(&source, &entry(), &dir.path().join("o"))
            .await
            .unwrap_err();

        match err {
            EncodeError::Failed(failure) => {
                assert_eq!(failure.resolution, "720p");
                assert_eq!(failure.exit_code, Some(1));
                assert!(failure.captured_stderr.contains("Invalid data found"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_segment_is_failure_and_no_manifest() {
        let dir = tempdir().unwrap();
        let source = source_in(dir.path());
        let out = dir.path().join("o");

        let mut executor = MockTranscodeExecutor::new();
        executor.expect_run().returning(|command| {
            fake_ffmpeg(command, 2);
            std::fs::remove_file(command.output_dir.join("segment_001.ts")).unwrap();
            Ok(create_mock_output("", 0))
        });

        let encoder = FfmpegEncoder::new("ffmpeg", executor);
        let err = encoder.encode(&source, &entry(), &out).await.unwrap_err();

        assert!(matches!(err, EncodeError::Failed(ref f) if f.captured_stderr.contains("segment_001.ts")));
        assert!(!out.join(MANIFEST_NAME).exists());
    }

    #[tokio::test]
    async fn test_timeout_reports_no_exit_code() {
        let dir = tempdir().unwrap();
        let source = source_in(dir.path());

        let mut executor = MockTranscodeExecutor::new();
        executor
            .expect_run()
            .returning(|_| Err(io::Error::new(io::ErrorKind::TimedOut, "encoder did not finish")));

        let encoder = FfmpegEncoder::new("ffmpeg", executor);
        let err = encoder
            .encode(&source, &entry(), &dir.path().join("o"))
            .await
            .unwrap_err();

        assert!(matches!(err, EncodeError::Failed(ref f) if f.exit_code.is_none()));
    }

    #[tokio::test]
    async fn test_reencode_is_deterministic_and_drops_stale_segments() {
        let dir = tempdir().unwrap();
        let source = source_in(dir.path());
        let out = dir.path().join("o");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("segment_009.ts"), b"stale").unwrap();

        let mut executor = MockTranscodeExecutor::new();
        executor.expect_run().times(2).returning(|command| {
            fake_ffmpeg(command, 2);
            Ok(create_mock_output("", 0))
        });
        let encoder = FfmpegEncoder::new("ffmpeg", executor);

        encoder.encode(&source, &entry(), &out).await.unwrap();
        let first = std::fs::read(out.join(MANIFEST_NAME)).unwrap();
        assert!(!out.join("segment_009.ts").exists());

        encoder.encode(&source, &entry(), &out).await.unwrap();
        assert_eq!(std::fs::read(out.join(MANIFEST_NAME)).unwrap(), first);
    }

    #[test]
    fn test_stderr_tail_respects_char_boundaries() {
        let long = "é".repeat(STDERR_TAIL_BYTES);
        let tail = stderr_tail(&long);
        assert!(tail.len() <= STDERR_TAIL_BYTES);
        assert!(tail.chars().all(|c| c == 'é'));
    }
}
