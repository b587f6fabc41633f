// Written by the target firmware at boot; the legacy firmware never creates it.
pub const BOARD_NAME_PATH: &str = "/tmp/sysinfo/board_name";

pub const LEGACY_BOARD_NAMES: [&str; 4] = ["dm1-g9", "dm1-g19", "dm1-g29", "am1-s9"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompatibilityReport {
    Compatible,
    Incompatible {
        board_name: String,
        native_upgrade: bool,
    },
}

pub fn assess_board_name(contents: Option<&str>) -> CompatibilityReport {
    let Some(contents) = contents else {
        return CompatibilityReport::Compatible;
    };

    let board_name = contents.lines().next().unwrap_or("").trim().to_string();
    let native_upgrade = LEGACY_BOARD_NAMES.contains(&board_name.as_str());
    CompatibilityReport::Incompatible {
        board_name,
        native_upgrade,
    }
}
