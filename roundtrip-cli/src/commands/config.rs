use clap::Args;

use roundtrip_core::error::HarnessError;

use super::Settings;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(flatten)]
    pub settings: Settings,

    /// Also validate the merged configuration
    #[arg(long)]
    pub check: bool,
}

pub fn run(args: &ConfigArgs) -> anyhow::Result<()> {
    let mut config = args.settings.resolve()?;
    if args.check {
        config.validate().map_err(HarnessError::from)?;
    }
    if !config.store.password.is_empty() {
        config.store.password = "********".to_string();
    }
    print!("{}", config.to_toml_string().map_err(HarnessError::from)?);
    Ok(())
}
