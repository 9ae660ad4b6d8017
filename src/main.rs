use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yt_transcript::{Config, FetchConfig, Formatter, JsonFormatter, TextFormatter, TranscriptApi};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

/// Download YouTube transcripts.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Video ID or watch URL
    video: String,

    /// Comma-separated language codes, in order of preference (all tracks if omitted)
    #[arg(short, long, value_delimiter = ',')]
    languages: Vec<String>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Keep inline formatting tags such as <b> and <i>
    #[arg(long)]
    preserve_formatting: bool,

    #[arg(long)]
    no_timestamps: bool,

    #[arg(long)]
    no_language_code: bool,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// Overall timeout in seconds, 0 for none (default: YTT_TIMEOUT_SECS or 30)
    #[arg(long)]
    timeout: Option<u64>,

    /// List available tracks instead of downloading them
    #[arg(long)]
    list: bool,
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    match run(args) {
        Ok(output) => {
            print!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> yt_transcript::Result<String> {
    let mut config = Config::from_env();
    if let Some(secs) = args.timeout {
        config.timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }

    let api = TranscriptApi::builder()
        .fetch_config(FetchConfig::from_env())
        .config(config)
        .build()?;

    if args.list {
        let metadata = api.list_tracks(&args.video)?;
        let mut out = format!("{}\n", metadata.title);
        for track in &metadata.tracks {
            out.push_str(&format!(
                "{:<8} {:<32} {:<10} {}\n",
                track.language_code,
                track.display_name(),
                if track.is_generated() { "generated" } else { "manual" },
                if track.is_translatable { "translatable" } else { "" },
            ));
        }
        return Ok(out);
    }

    let formatter: Box<dyn Formatter> = match args.format {
        OutputFormat::Json => Box::new(JsonFormatter {
            pretty: args.pretty,
            include_timestamps: !args.no_timestamps,
        }),
        OutputFormat::Text => Box::new(TextFormatter {
            include_timestamps: !args.no_timestamps,
            include_language_code: !args.no_language_code,
        }),
    };

    let mut output = api.get_formatted(
        &args.video,
        args.languages.as_slice(),
        args.preserve_formatting,
        formatter.as_ref(),
    )?;
    if !output.ends_with('\n') {
        output.push('\n');
    }
    Ok(output)
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "yt_transcript=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
