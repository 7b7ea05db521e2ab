use argh::FromArgs;
use std::path::PathBuf;

#[derive(FromArgs, Debug, Default)]
/// Live heart rate charts and stream overlays for BLE heart rate monitors
pub struct TopLevelCmd {
    /// specify config file path, creates file if it doesn't exist
    #[argh(option, short = 'c')]
    pub config_override: Option<PathBuf>,
    /// config file must exist, including "config_override" files
    #[argh(switch, short = 'r')]
    pub config_required: bool,
    /// use config file as-is (don't save over it)
    #[argh(switch, short = 'n')]
    pub no_save: bool,
    /// no terminal UI, connect to the saved device and only feed the outputs
    #[argh(switch)]
    pub headless: bool,
    #[argh(subcommand)]
    pub subcommands: Option<SubCommands>,
}

impl TopLevelCmd {
    pub fn use_dummy(&self) -> bool {
        matches!(self.subcommands, Some(SubCommands::Dummy(_)))
    }
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
pub enum SubCommands {
    Ble(BleCmd),
    Dummy(DummyCmd),
}

/// connect to a BLE device with the HR Measure characteristic
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "ble")]
pub struct BleCmd {}

/// use a simulated heart rate monitor for testing overlays
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "dummy")]
pub struct DummyCmd {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_subcommand() {
        let cmd = TopLevelCmd::from_args(
            &["heartline"],
            &["-c", "custom.toml", "-n", "--headless", "dummy"],
        )
        .unwrap();
        assert_eq!(cmd.config_override, Some(PathBuf::from("custom.toml")));
        assert!(cmd.no_save);
        assert!(cmd.headless);
        assert!(!cmd.config_required);
        assert!(cmd.use_dummy());
    }

    #[test]
    fn ble_is_the_default() {
        let cmd = TopLevelCmd::from_args(&["heartline"], &[]).unwrap();
        assert!(cmd.subcommands.is_none());
        assert!(!cmd.use_dummy());
    }
}
