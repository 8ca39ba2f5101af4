//! `parley ask`: One question, one answer.
//!
//! Uses the agent's system prompt but no memory, and tool directives in
//! the answer are printed as-is rather than run.

use std::path::Path;

use parley_agent::{DEFAULT_TEMPLATE, render_system_prompt};
use parley_core::provider::ModelSession;

pub async fn run(config_path: &Path, message: &str) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let model = super::build_model(&config)?;
    let tools = super::build_tools(&config)?;

    let mut session = ModelSession::new(model);
    session.set_system_prompt(render_system_prompt(DEFAULT_TEMPLATE, &tools));

    let answer = session.generate(message, Vec::new()).await?;
    println!("{answer}");
    Ok(())
}
