use anyhow::Result;
use clap::Args;

use super::analysis::{AnalysisArgs, envelope_failure, load};
use crate::config::RuntimePaths;
use crate::models::{Envelope, ErrorCode};
use crate::verify::{VerifyStatus, build_artifact_layout, verify_snapshot, write_report_artifact};

#[derive(Debug, Clone, Args)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub analysis: AnalysisArgs,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug)]
pub struct VerificationCommandFailure {
    pub mismatches: usize,
    pub first_question: Option<String>,
}

impl std::fmt::Display for VerificationCommandFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "verification failed with {} mismatched question(s).",
            self.mismatches
        )?;
        if let Some(question) = &self.first_question {
            write!(f, " first mismatch: {question}")?;
        }
        Ok(())
    }
}

impl std::error::Error for VerificationCommandFailure {}

pub fn run(args: &VerifyArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    if !args.json {
        println!(
            "verify: start db={} out_dir={}",
            runtime_paths.database.display(),
            runtime_paths.out_dir.display()
        );
    }

    let result = args.analysis.to_config().and_then(|config| {
        let (connection, snapshot) = load(runtime_paths)?;
        let report = verify_snapshot(
            &connection,
            &snapshot,
            &config,
            &runtime_paths.database.display().to_string(),
        )?;
        let artifacts = build_artifact_layout(&runtime_paths.out_dir);
        write_report_artifact(&artifacts.report_json, &report)?;
        Ok((report, artifacts))
    });
    let (report, artifacts) = if args.json {
        result.map_err(|error| envelope_failure("verify", &error))?
    } else {
        result?
    };

    let failure = (report.status == VerifyStatus::Fail).then(|| VerificationCommandFailure {
        mismatches: report.mismatches,
        first_question: report
            .first_mismatch()
            .map(|check| format!("{} ({})", check.question, check.description)),
    });

    if args.json {
        let data = serde_json::to_value(&report)?;
        let envelope = match &failure {
            None => Envelope::ok("verify", data),
            Some(failure) => {
                Envelope::error("verify", ErrorCode::ParityMismatch, failure.to_string())
                    .with_data(data)
            }
        }
        .with_database(&runtime_paths.database)
        .with_report_path(&artifacts.report_json);
        println!("{}", envelope.encode()?);
    } else {
        for check in &report.checks {
            println!(
                "verify: {} {} ({})",
                check.question,
                if check.matches { "match" } else { "MISMATCH" },
                check.description
            );
        }
        println!(
            "verify: report checks={} mismatches={} report={}",
            report.checks_run,
            report.mismatches,
            artifacts.report_json.display()
        );
    }

    if let Some(failure) = failure {
        if !args.json {
            eprintln!(
                "verify: failed mismatches={} next=inspect_report",
                failure.mismatches
            );
        }
        return Err(failure.into());
    }

    if !args.json {
        println!(
            "verify: complete next=review {}",
            artifacts.report_json.display()
        );
    }
    Ok(())
}
