//! `toolrelay tools`: print the tool schemas the model is offered.

use toolrelay_tools::default_registry;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render()?);
    Ok(())
}

fn render() -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&default_registry().schemas())
}
