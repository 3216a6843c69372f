use std::fs;
use std::process::ExitCode;

use jscal_bridge::{to_ical, to_js, JsEvent, TranslatorConfig};

fn usage() -> ! {
    eprintln!("usage: jscal-bridge <to-js|to-ical> <path>");
    std::process::exit(2);
}

fn run() -> Result<(), String> {
    let mut args = std::env::args().skip(1);
    let mode = args.next().unwrap_or_else(|| usage());
    let path = args.next().unwrap_or_else(|| usage());
    let contents = fs::read_to_string(&path).map_err(|e| format!("reading {path}: {e}"))?;

    match mode.as_str() {
        "to-js" => {
            let calendar: icalendar::Calendar = contents
                .parse()
                .map_err(|e| format!("parsing iCal document: {e}"))?;
            match to_js(&calendar, None) {
                Ok(Some(js)) => {
                    let json = serde_json::to_string_pretty(&js).map_err(|e| e.to_string())?;
                    println!("{json}");
                    Ok(())
                }
                Ok(None) => Err("no main VEVENT found in document".to_string()),
                Err(err) => Err(jscal_bridge::strerror(&err)),
            }
        }
        "to-ical" => {
            let js: JsEvent = serde_json::from_str(&contents).map_err(|e| e.to_string())?;
            let config = TranslatorConfig::default();
            match to_ical(&js, &config) {
                Ok(calendar) => {
                    print!("{calendar}");
                    Ok(())
                }
                Err(err) => Err(jscal_bridge::strerror(&err)),
            }
        }
        _ => usage(),
    }
}

fn main() -> ExitCode {
    // Log to stderr so stdout stays reserved for the translated document.
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            tracing::error!(%message, "conversion failed");
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}
