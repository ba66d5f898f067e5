use std::path::{Path, PathBuf};

const SETTINGS_FILE: &str = "materialfe_settings.cfg";

/// Compositor tunables that persist across runs.
#[derive(Clone, Debug, PartialEq)]
pub struct CompositorSettings {
    /// Materials are downscaled so neither edge exceeds this, in pixels.
    pub max_material_edge: u32,
    /// Maximum undo entries; 0 keeps everything.
    pub history_limit: usize,
    /// Drop the draft polygon after a successful apply instead of keeping it
    /// around marked as applied.
    pub clear_polygon_after_apply: bool,
    /// `off`, `error`, `warn`, `info`, `debug` or `trace`.
    pub log_level: String,
}

impl Default for CompositorSettings {
    fn default() -> Self {
        Self {
            max_material_edge: 1024,
            history_limit: 0,
            clear_polygon_after_apply: true,
            log_level: "info".to_string(),
        }
    }
}

impl CompositorSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/materialfe/materialfe_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\MaterialFE\materialfe_settings.cfg
    /// On macOS:   ~/Library/Application Support/MaterialFE/materialfe_settings.cfg
    /// Fallback:   same directory as the executable.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
                .ok()?
                .join("materialfe");
            Some(config_dir.join(SETTINGS_FILE))
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            Some(PathBuf::from(appdata).join("MaterialFE").join(SETTINGS_FILE))
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("MaterialFE")
                    .join(SETTINGS_FILE),
            )
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join(SETTINGS_FILE)))
        }
    }

    /// Load settings from the default location (defaults if missing or corrupt).
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    /// Parse `key=value` lines. Unknown keys and unparsable values are
    /// ignored, leaving the default in place.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "max_material_edge" => {
                    if let Ok(v) = val.parse::<u32>()
                        && v > 0
                    {
                        s.max_material_edge = v;
                    }
                }
                "history_limit" => {
                    s.history_limit = val.parse().unwrap_or(s.history_limit);
                }
                "clear_polygon_after_apply" => {
                    s.clear_polygon_after_apply = val == "true";
                }
                "log_level" => {
                    if val.parse::<log::LevelFilter>().is_ok() {
                        s.log_level = val.to_ascii_lowercase();
                    }
                }
                _ => {}
            }
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "max_material_edge={}\n\
             history_limit={}\n\
             clear_polygon_after_apply={}\n\
             log_level={}\n",
            self.max_material_edge, self.history_limit, self.clear_polygon_after_apply, self.log_level,
        )
    }

    /// Save to the default location.
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::settings_path()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no settings directory"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())
    }

    /// History limit as the stack wants it.
    pub fn history_limit_opt(&self) -> Option<usize> {
        (self.history_limit > 0).then_some(self.history_limit)
    }

    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = CompositorSettings::default();
        assert_eq!(s.max_material_edge, 1024);
        assert_eq!(s.history_limit_opt(), None);
        assert!(s.clear_polygon_after_apply);
        assert_eq!(s.log_level_filter(), log::LevelFilter::Info);
    }

    #[test]
    fn parse_ignores_junk() {
        let s = CompositorSettings::parse(
            "# comment\nmax_material_edge=512\nhistory_limit=abc\nnonsense\nfoo=bar\n\
             clear_polygon_after_apply=false\nlog_level=DEBUG\n",
        );
        assert_eq!(s.max_material_edge, 512);
        assert_eq!(s.history_limit, 0);
        assert!(!s.clear_polygon_after_apply);
        assert_eq!(s.log_level_filter(), log::LevelFilter::Debug);

        let zero = CompositorSettings::parse("max_material_edge=0\nlog_level=loud\n");
        assert_eq!(zero, CompositorSettings::default());
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);
        let s = CompositorSettings {
            max_material_edge: 256,
            history_limit: 20,
            clear_polygon_after_apply: false,
            log_level: "warn".to_string(),
        };
        s.save_to(&path).unwrap();
        assert_eq!(CompositorSettings::load_from(&path), s);
        assert_eq!(CompositorSettings::load_from(&dir.path().join("missing.cfg")), CompositorSettings::default());
    }
}
