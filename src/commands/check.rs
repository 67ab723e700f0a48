//! Check command implementation

use std::path::Path;

use fpctl_core::variant::{PowerScheme, Settle};
use fpctl_core::SensorConfig;

/// Parse and validate a board file, then print what it resolves to
pub fn run_check(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = SensorConfig::from_toml_file(path)?;
    config.validate()?;

    let profile = config.profile();
    println!("Board file: {}", path.display());
    println!(
        "Variant:    {} ({})",
        config.variant,
        config.variant.compatible()
    );
    println!("Device:     {}.<minor>", profile.dev_name);
    println!();

    println!("Lines:");
    for (name, line) in &config.lines {
        println!("  {:<24} {}", name, line);
    }

    match profile.power {
        PowerScheme::EnableLines(names) => {
            println!("Power:      enable lines {}", names.join(", "));
        }
        PowerScheme::Regulator(name) => {
            let id = config.supply(name)?;
            println!("Power:      regulator {} -> {}", name, id);
        }
    }

    println!(
        "Pin states: active '{}', suspend '{}'",
        config.pinctrl.active, config.pinctrl.suspend
    );
    for (name, bundle) in &config.pinctrl.states {
        let lines: Vec<String> = bundle.lines.iter().map(|l| l.to_string()).collect();
        println!("  {:<24} lines [{}] bias {}", name, lines.join(", "), bundle.bias);
    }

    let timing = &config.timing;
    let settle = match timing.settle {
        Settle::Fixed(hold) => format!("{:?}", hold),
        Settle::Caller { default } => format!("caller supplied (default {:?})", default),
    };
    println!(
        "Reset:      high {:?}, low {:?}, settle {}",
        timing.high1, timing.low, settle
    );
    println!("Wake hold:  {:?}", config.wake_hold);
    println!();
    println!("Board file OK");
    Ok(())
}
