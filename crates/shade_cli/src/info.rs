//! `shade info`: report the active backend and its capabilities.

use shade_common::ShaderModel;
use shade_compiler::Feature;

use crate::GlobalArgs;

/// Prints backend, model range and feature support.
pub fn run(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let manager = global.open_manager()?;
    println!("backend:     {}", manager.active_backend());
    println!("max model:   {}", manager.max_model());
    let models: Vec<String> = ShaderModel::ALL
        .into_iter()
        .filter(|m| manager.supports_model(*m))
        .map(|m| m.to_string())
        .collect();
    println!("models:      {}", models.join(", "));
    for feature in Feature::ALL {
        let state = if manager.supports_feature(feature) { "yes" } else { "no" };
        println!("{:<13}{state}", format!("{}:", feature.name()));
    }
    Ok(0)
}
