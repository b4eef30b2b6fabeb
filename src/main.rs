use anyhow::Result;
use leveling::settings::Settings;
use leveling::{logging, result_to_json, run_from_settings, ProductLine};

fn main() -> Result<()> {
    let settings = Settings::from_env();
    logging::init(&settings.log_filter);

    let report = run_from_settings(&settings)?;
    for line in ProductLine::ALL {
        if let Ok(result) = report.line(line) {
            println!("{}", result_to_json(result)?);
        }
    }

    for warning in &report.warnings {
        tracing::warn!(subject = %warning.subject, "{}", warning.message);
    }

    if report.succeeded() < ProductLine::ALL.len() {
        anyhow::bail!("{} 條產線計算失敗", ProductLine::ALL.len() - report.succeeded());
    }
    Ok(())
}
