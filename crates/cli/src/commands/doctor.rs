//! `parley doctor`: Diagnose configuration and connectivity.

use std::path::Path;
use std::time::Duration;

use parley_config::AppConfig;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    println!("Parley Doctor");
    println!("=============\n");

    let mut issues = 0;

    if config_path.exists() {
        println!("  ✅ Config file: {}", config_path.display());
    } else {
        println!("  ⚠️  No config file at {} (defaults + environment)", config_path.display());
    }

    let config = match super::load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("  ❌ Config invalid: {e:#}");
            return Err(e);
        }
    };

    issues += report_credentials(&config);

    match super::build_model(&config) {
        Ok(model) => match tokio::time::timeout(HEALTH_TIMEOUT, model.health_check()).await {
            Ok(Ok(true)) => println!("  ✅ Model reachable ({} / {})", model.name(), config.model.name),
            Ok(Ok(false)) => {
                println!("  ❌ Model health check failed ({})", config.model.name);
                issues += 1;
            }
            Ok(Err(e)) => {
                println!("  ❌ Model health check failed: {e}");
                issues += 1;
            }
            Err(_) => {
                println!("  ❌ Model health check timed out after {}s", HEALTH_TIMEOUT.as_secs());
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Model unavailable: {e:#}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

fn report_credentials(config: &AppConfig) -> usize {
    let mut issues = 0;

    if config.has_api_key() {
        println!("  ✅ Model API key configured");
    } else {
        println!("  ❌ No model API key (GEMINI_API_KEY)");
        issues += 1;
    }

    if config.require_bot_token().is_ok() {
        println!("  ✅ Discord bot token configured");
    } else {
        println!("  ❌ No Discord bot token (DISCORD_BOT_TOKEN)");
        issues += 1;
    }

    // Search still answers without credentials, just with an error string.
    if config.tools.google.is_configured() {
        println!("  ✅ Google search configured");
    } else {
        println!("  ⚠️  Google search not configured (GOOGLE_API_KEY, GOOGLE_CSE_ID)");
    }

    issues
}
