//! `failstorm logs` command handler

use std::io::Write;

use serde::Serialize;

use failstorm_core::config::FailstormConfig;
use failstorm_node_control::validate_instance_name;

use crate::cli::LogsArgs;
use crate::commands::connect_controller;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `logs` command.
pub async fn execute(
    args: LogsArgs,
    config: &FailstormConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    validate_instance_name(&args.instance)?;

    let controller = connect_controller(config)?;
    let lines = controller
        .logs(&args.instance, args.tail, &args.keywords)
        .await?;

    writer.render(&LogReport {
        instance: args.instance,
        tail: args.tail,
        keywords: args.keywords,
        lines,
    })?;
    Ok(())
}

#[derive(Serialize)]
pub struct LogReport {
    pub instance: String,
    pub tail: usize,
    pub keywords: Vec<String>,
    pub lines: Vec<String>,
}

impl Render for LogReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let filter = if self.keywords.is_empty() {
            String::new()
        } else {
            format!(", matching {}", self.keywords.join("|"))
        };
        writeln!(
            w,
            "{} (last {} lines{}): {} matched",
            self.instance.bold(),
            self.tail,
            filter,
            self.lines.len()
        )?;
        for line in &self.lines {
            writeln!(w, "{}", line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_report_render_text() {
        let report = LogReport {
            instance: "milvus-querynode1".to_owned(),
            tail: 50,
            keywords: vec!["error".to_owned(), "panic".to_owned()],
            lines: vec!["[ERROR] failed to load segment".to_owned()],
        };
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("last 50 lines"));
        assert!(output.contains("error|panic"));
        assert!(output.contains("1 matched"));
        assert!(output.contains("failed to load segment"));
    }
}
