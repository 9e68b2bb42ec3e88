use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use super::SynthesisEngine;
use crate::config::PiperCliConfig;
use crate::error::SynthesisError;

const STDERR_SNIPPET: usize = 500;

/// Runs the piper binary once per request, text on stdin, WAV to `-f`.
pub struct CommandEngine {
    config: PiperCliConfig,
}

impl CommandEngine {
    pub fn new(config: PiperCliConfig) -> Self {
        Self { config }
    }

    fn args(&self, destination: &Path) -> Vec<OsString> {
        let cfg = &self.config;
        let mut args: Vec<OsString> = vec![
            "-m".into(),
            cfg.voice.clone().into(),
            "-f".into(),
            destination.into(),
        ];
        if let Some(json) = &cfg.voice_json {
            args.push("-c".into());
            args.push(json.clone().into());
        }
        let tuning = [
            ("-s", &cfg.speaker),
            ("-l", &cfg.length_scale),
            ("-p", &cfg.noise_scale),
            ("-r", &cfg.noise_w),
        ];
        for (flag, value) in tuning {
            if let Some(value) = value {
                args.push(flag.into());
                args.push(value.into());
            }
        }
        args
    }

    fn command(&self, destination: &Path) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        cmd.args(self.args(destination))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        // The release tarball ships its shared libraries next to the binary.
        if let Some(dir) = self.config.binary.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
            #[cfg(not(windows))]
            {
                let mut paths = vec![dir.to_path_buf()];
                if let Some(existing) = std::env::var_os("LD_LIBRARY_PATH") {
                    paths.extend(std::env::split_paths(&existing));
                }
                if let Ok(joined) = std::env::join_paths(paths) {
                    cmd.env("LD_LIBRARY_PATH", joined);
                }
            }
        }
        cmd
    }
}

impl SynthesisEngine for CommandEngine {
    fn name(&self) -> &str {
        "piper-cli"
    }

    fn synthesize(&self, text: &str, destination: &Path) -> Result<(), SynthesisError> {
        let mut cmd = self.command(destination);
        debug!("Spawning {:?}", cmd);
        let mut child = cmd
            .spawn()
            .map_err(|e| SynthesisError::engine("piper-cli", format!("spawn {}: {e}", self.config.binary.display())))?;

        // A piper that dies early closes stdin; its exit status and stderr
        // explain more than the broken pipe does.
        let write_result = match child.stdin.take() {
            Some(mut stdin) => {
                // piper reads one utterance per line
                let line = format!("{}\n", text.replace(['\r', '\n'], " "));
                stdin.write_all(line.as_bytes())
            }
            None => Ok(()),
        };

        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr);
        }

        let status = child.wait()?;
        if !status.success() {
            let snippet: String = stderr.chars().take(STDERR_SNIPPET).collect();
            return Err(SynthesisError::engine(
                "piper-cli",
                format!("piper exited with {status}: {}", snippet.trim()),
            ));
        }
        write_result.map_err(|e| SynthesisError::engine("piper-cli", format!("writing text to piper: {e}")))?;
        Ok(())
    }
}
