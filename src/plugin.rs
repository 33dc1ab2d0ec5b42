//! Adapter between the overlay core and a host image viewer.
//!
//! The host drives a [`LocalPlugin`] through three hooks and hands it its canvas,
//! the current image header and its preferences store at call time. Nothing here
//! runs on its own thread or outlives a call.

use std::collections::HashMap;
use std::hash::BuildHasher;
use std::path::Path;

use log::{debug, info};

use crate::bars::Header;
use crate::config::{parse_bar_dist, parse_bar_num, Config, PluginSettings};
use crate::error::Result;
use crate::overlay::{Canvas, DrawList, Overlay};

/// Host preferences category for one plugin.
pub trait SettingsStore {
    /// Stored value of `key`.
    fn get(&self, key: &str) -> Option<String>;
    /// Store `value` under `key`.
    fn set(&mut self, key: &str, value: String);
}

impl<S: BuildHasher> SettingsStore for HashMap<String, String, S> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_string(), value);
    }
}

/// Whether the host opens one instance per channel or one overall.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PluginKind {
    /// One instance per image channel.
    Local,
    /// A single instance.
    Global,
}

/// Registration record the host uses to list and launch a plugin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PluginSpec {
    /// Lower-case plugin name, also the preferences category suffix.
    pub name: &'static str,
    /// Module path.
    pub module: &'static str,
    /// Title shown on the plugin's tab.
    pub tab: &'static str,
    /// Host workspace the plugin opens in.
    pub workspace: &'static str,
    /// Plugin kind.
    pub kind: PluginKind,
    /// Host preferences category holding the plugin's settings.
    pub settings_category: &'static str,
}

/// Hooks a host calls on a local plugin.
pub trait LocalPlugin {
    /// Registration record.
    fn spec(&self) -> PluginSpec;
    /// Called once when the plugin is opened.
    fn init(&mut self, settings: &dyn SettingsStore);
    /// Called when a new image is shown in the plugin's channel.
    fn on_image_loaded(&mut self, canvas: &mut dyn Canvas, header: &dyn Header) -> Result<()>;
    /// Called when the plugin is closed.
    fn on_close(&mut self, canvas: &mut dyn Canvas, settings: &mut dyn SettingsStore);
}

/// CSU bar overlay and bar control plugin.
#[derive(Clone, Debug)]
pub struct CsuInitializer {
    overlay: Overlay,
    settings: PluginSettings,
}

impl CsuInitializer {
    /// Preferences category used for [`PluginSettings`].
    pub const SETTINGS_CATEGORY: &'static str = "plugin_CSU_initializer";

    /// Plugin for a configuration, with default settings until [`init`](LocalPlugin::init).
    pub fn new(config: &Config) -> Self {
        Self {
            overlay: Overlay::new(config),
            settings: PluginSettings::default(),
        }
    }

    /// Current settings.
    pub fn settings(&self) -> &PluginSettings {
        &self.settings
    }

    /// The renderer.
    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    /// Bar number entry. Returns the text to show in the bar number label.
    pub fn set_bar_num(&mut self, text: &str) -> Result<String> {
        self.settings.bar_num = parse_bar_num(text)?;
        info!("Selected bar {}", self.settings.bar_num);
        Ok(format!("{:2}", self.settings.bar_num))
    }

    /// Move distance entry. Returns the text to show in the distance label.
    pub fn set_bar_dist(&mut self, text: &str) -> Result<String> {
        self.settings.bar_dist = parse_bar_dist(text)?;
        info!("Bar move distance set to {} mm", self.settings.bar_dist);
        Ok(format!("{:.1}", self.settings.bar_dist))
    }

    /// "Move to open" check button.
    pub fn set_move_to_open(&mut self, move_to_open: bool) {
        self.settings.move_to_open = move_to_open;
        debug!("move_to_open = {move_to_open}");
    }

    /// Replace the overlay with the bars from a status file.
    pub fn overlay_from_file(
        &self,
        canvas: &mut dyn Canvas,
        path: impl AsRef<Path>,
    ) -> Result<usize> {
        let path = path.as_ref();
        info!("Overlaying bar status from {}", path.display());
        let mut drawn = DrawList::new();
        let count = self.overlay.overlay_from_file(&mut drawn, path)?;
        Overlay::clear(canvas);
        drawn.replay(canvas);
        Ok(count)
    }

    /// Remove the overlay.
    pub fn clear_overlay(&self, canvas: &mut dyn Canvas) {
        Overlay::clear(canvas);
    }
}

impl Default for CsuInitializer {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl LocalPlugin for CsuInitializer {
    fn spec(&self) -> PluginSpec {
        PluginSpec {
            name: "csu_initializer",
            module: "csu_initializer::plugin",
            tab: "CSU Initializer",
            workspace: "dialogs",
            kind: PluginKind::Local,
            settings_category: Self::SETTINGS_CATEGORY,
        }
    }

    fn init(&mut self, settings: &dyn SettingsStore) {
        self.settings = PluginSettings::load(settings);
        debug!("Loaded settings {:?}", self.settings);
    }

    fn on_image_loaded(&mut self, canvas: &mut dyn Canvas, header: &dyn Header) -> Result<()> {
        Overlay::clear(canvas);
        self.overlay.overlay_from_header(canvas, header)?;
        Ok(())
    }

    fn on_close(&mut self, canvas: &mut dyn Canvas, settings: &mut dyn SettingsStore) {
        Overlay::clear(canvas);
        self.settings.save(settings);
        info!("Closed {}", self.spec().name);
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use simplelog::{Config as LogConfig, LevelFilter, TestLogger};

    use super::*;
    use crate::bars::tests::full_header;
    use crate::error::CsuError;
    use crate::overlay::Color;

    fn init_logger() {
        let _ = TestLogger::init(LevelFilter::Debug, LogConfig::default());
    }

    #[test]
    fn lifecycle() {
        init_logger();
        let mut store: HashMap<String, String> =
            HashMap::from([("bar_num".to_string(), "12".to_string())]);
        let mut canvas = DrawList::new();
        let mut plugin = CsuInitializer::default();

        plugin.init(&store);
        assert_eq!(plugin.settings().bar_num, 12);

        plugin.on_image_loaded(&mut canvas, &full_header()).unwrap();
        assert_eq!(canvas.polygons().len(), 92);

        // A second image replaces the overlay instead of stacking on it.
        plugin.on_image_loaded(&mut canvas, &full_header()).unwrap();
        assert_eq!(canvas.polygons().len(), 92);

        plugin.set_move_to_open(true);
        plugin.on_close(&mut canvas, &mut store);
        assert!(canvas.is_empty());
        assert_eq!(store.get("move_to_open").map(String::as_str), Some("true"));
        assert_eq!(store.get("bar_num").map(String::as_str), Some("12"));
    }

    #[test]
    fn image_without_bar_keys() {
        init_logger();
        let mut canvas = DrawList::new();
        let mut plugin = CsuInitializer::default();
        let header: HashMap<String, String> = HashMap::new();

        assert!(matches!(
            plugin.on_image_loaded(&mut canvas, &header),
            Err(CsuError::MissingBarKey(1))
        ));
        assert!(canvas.is_empty());
    }

    #[test]
    fn text_entries() {
        let mut plugin = CsuInitializer::default();

        assert_eq!(plugin.set_bar_num("7").unwrap(), " 7");
        assert_eq!(plugin.set_bar_num("45").unwrap(), "45");
        assert!(matches!(
            plugin.set_bar_num("abc"),
            Err(CsuError::InvalidSetting { name: "bar_num", .. })
        ));
        assert_eq!(plugin.settings().bar_num, 45);

        assert_eq!(plugin.set_bar_dist("2.34").unwrap(), "2.3");
        assert_abs_diff_eq!(plugin.settings().bar_dist, 2.34);
        assert!(plugin.set_bar_dist("").is_err());
    }

    #[test]
    fn status_file_overlay_replaces_previous() {
        init_logger();
        let path = std::env::temp_dir()
            .join(format!("csu_plugin_status_{}.txt", std::process::id()));
        let text = (1..=92)
            .map(|bar| format!("{bar},{}.0,{}\n", 100 + bar, if bar == 1 { -3 } else { 2 }))
            .collect::<String>();
        std::fs::write(&path, text).unwrap();

        let mut plugin = CsuInitializer::default();
        let mut canvas = DrawList::new();
        plugin.on_image_loaded(&mut canvas, &full_header()).unwrap();
        assert_eq!(canvas.polygons()[0].color, Color::Blue);
        assert_eq!(plugin.overlay_from_file(&mut canvas, &path).unwrap(), 92);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(canvas.polygons().len(), 92);
        assert_eq!(canvas.polygons()[0].color, Color::Red);
        assert_eq!(canvas.polygons()[1].color, Color::Green);

        // A failed load keeps what was drawn.
        assert!(plugin.overlay_from_file(&mut canvas, "/nonexistent/status.txt").is_err());
        assert_eq!(canvas.polygons().len(), 92);

        plugin.clear_overlay(&mut canvas);
        assert!(canvas.is_empty());
    }

    #[test]
    fn registration() {
        let spec = CsuInitializer::default().spec();
        assert_eq!(spec.name, "csu_initializer");
        assert_eq!(spec.kind, PluginKind::Local);
        assert_eq!(spec.settings_category, "plugin_CSU_initializer");
    }
}
