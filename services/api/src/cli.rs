use crate::infra::load_hospitals;
use crate::server;
use clap::{Args, Parser, Subcommand};
use medchain::error::AppError;
use medchain::matching::{score_hospitals, EmergencyDescriptor, GeoPoint, HospitalSource};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "MedChain Emergency Matching",
    about = "Match emergencies to hospitals on remote compute backends",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Score a hospital snapshot locally and print the ranked outcome as JSON
    Score(ScoreArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct ScoreArgs {
    /// Emergency latitude in degrees
    #[arg(long, allow_negative_numbers = true)]
    pub(crate) lat: f64,
    /// Emergency longitude in degrees
    #[arg(long, allow_negative_numbers = true)]
    pub(crate) lng: f64,
    /// Severity from 1 to 10
    #[arg(long, default_value_t = 7)]
    pub(crate) severity: u8,
    /// Emergency category, e.g. cardiac or trauma
    #[arg(long = "type", default_value = "general")]
    pub(crate) emergency_type: String,
    /// Hospital snapshot JSON; the bundled sample is used when omitted
    #[arg(long)]
    pub(crate) hospitals: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Score(args) => run_score(args),
    }
}

fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    let emergency = EmergencyDescriptor::new(
        None,
        GeoPoint::new(args.lat, args.lng),
        args.severity,
        args.emergency_type,
        None,
    )?;
    let hospitals = load_hospitals(args.hospitals.as_deref())?.snapshot()?;
    let outcome = score_hospitals(&hospitals, &emergency);

    let rendered = serde_json::to_string_pretty(&outcome).map_err(std::io::Error::from)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_command_parses_coordinates() {
        let cli = Cli::try_parse_from([
            "medchain-api",
            "score",
            "--lat",
            "44.42",
            "--lng",
            "-26.10",
            "--severity",
            "9",
        ])
        .expect("arguments parse");

        match cli.command {
            Some(Command::Score(args)) => {
                assert_eq!(args.lat, 44.42);
                assert_eq!(args.lng, -26.10);
                assert_eq!(args.severity, 9);
                assert_eq!(args.emergency_type, "general");
                assert!(args.hospitals.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn score_command_rejects_invalid_severity() {
        let args = ScoreArgs {
            lat: 44.42,
            lng: 26.10,
            severity: 0,
            emergency_type: "general".to_string(),
            hospitals: None,
        };
        assert!(matches!(run_score(args), Err(AppError::InvalidEmergency(_))));
    }
}
