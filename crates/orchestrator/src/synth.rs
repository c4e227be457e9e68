//! Speech synthesis through an external program.

use std::io::ErrorKind;
use std::process::Stdio;

use async_trait::async_trait;
use relay_core::{SynthesisError, Synthesizer};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Runs a synthesis program once per reply.
///
/// The program receives one segment per line on stdin and a
/// `--speaker <path>` pair per reference voice after its own arguments. It
/// writes the path or URL of the finished audio as the last non-empty line
/// of stdout and exits 0.
///
/// # Example
///
/// ```rust,ignore
/// let synth = CommandSynthesizer::from_command_line("python3 tts_sidecar.py --out /srv/audio")?;
/// let link = synth.synthesize(&segments, &["voices/aria.wav".into()]).await?;
/// ```
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    program: String,
    args: Vec<String>,
}

impl CommandSynthesizer {
    /// Run `program` with no extra arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Add arguments passed before the speaker flags.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Split a whitespace-separated command line into program and arguments.
    ///
    /// Returns `None` for a blank line. No shell quoting is applied.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let program = words.next()?;
        Some(Self::new(program).with_args(words))
    }
}

#[async_trait]
impl Synthesizer for CommandSynthesizer {
    async fn synthesize(
        &self,
        segments: &[String],
        speakers: &[String],
    ) -> Result<String, SynthesisError> {
        info!(
            "Synthesizing {} segment(s) with {} speaker reference(s)",
            segments.len(),
            speakers.len()
        );

        let mut command = Command::new(&self.program);
        command.args(&self.args);
        for speaker in speakers {
            command.arg("--speaker").arg(speaker);
        }

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            let mut input = segments.join("\n");
            input.push('\n');
            match stdin.write_all(input.as_bytes()).await {
                Ok(()) => {}
                // the exit status below says what went wrong
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                    warn!("Synthesizer closed stdin early");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let output = child.wait_with_output().await?;

        if !output.status.success() {
            return Err(SynthesisError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let artifact = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or(SynthesisError::NoArtifact)?;

        debug!("Synthesizer produced {}", artifact);
        Ok(artifact.to_string())
    }

    fn name(&self) -> &str {
        &self.program
    }
}
