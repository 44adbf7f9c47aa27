//! External OCR command
//!
//! Pipes PDF bytes into a configured program (e.g. `pdftotext - -`) and
//! takes its stdout as the document text.

use std::io::ErrorKind;
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use dm_documents::OcrEngine;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub struct CommandOcrEngine {
    program: String,
    args: Vec<String>,
}

impl CommandOcrEngine {
    /// Split a command line on whitespace into program and arguments
    pub fn parse(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

#[async_trait]
impl OcrEngine for CommandOcrEngine {
    async fn extract_text(&self, pdf: Bytes) -> Result<String, String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("{}: {}", self.program, e))?;

        // Feed stdin while stdout drains, or a full pipe blocks both sides
        let stdin = child.stdin.take();
        let feed = async move {
            match stdin {
                Some(mut stdin) => stdin.write_all(&pdf).await,
                None => Ok(()),
            }
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());

        let output = output.map_err(|e| e.to_string())?;
        if !output.status.success() {
            return Err(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        // A program may stop reading early and still succeed
        if let Err(e) = fed {
            if e.kind() != ErrorKind::BrokenPipe {
                return Err(e.to_string());
            }
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
