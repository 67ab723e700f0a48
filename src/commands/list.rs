//! List commands implementation

use fpctl_core::variant::PowerScheme;
use fpctl_core::SensorVariant;

/// List all compiled-in backends
pub fn list_backends() {
    let backends = fpctl_platform::available_backends();
    if backends.is_empty() {
        println!("No backends compiled in (recompile with features)");
        return;
    }

    println!("Supported backends:");
    println!();
    for backend in backends {
        if backend.aliases.is_empty() {
            println!("  {:<12} - {}", backend.name, backend.description);
        } else {
            println!(
                "  {:<12} - {} (aliases: {})",
                backend.name,
                backend.description,
                backend.aliases.join(", ")
            );
        }
    }
}

/// List all supported sensor variants
pub fn list_variants() {
    println!("Supported sensors:");
    println!();
    println!("{:<10} {:<22} {:<12} {}", "Variant", "Compatible", "Device", "Power");
    println!("{}", "-".repeat(64));

    for variant in SensorVariant::ALL {
        let profile = variant.profile();
        let power = match profile.power {
            PowerScheme::EnableLines(names) => format!("{} enable lines", names.len()),
            PowerScheme::Regulator(name) => format!("regulator '{}'", name),
        };
        println!(
            "{:<10} {:<22} {:<12} {}",
            variant.to_string(),
            variant.compatible(),
            profile.dev_name,
            power
        );
    }
}
