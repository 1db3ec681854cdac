//! Resolves the settings components of loaded, activated plugins.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::cache::{CacheId, TransientCache};
use crate::error::Result;

/// Which settings component to look up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsKind {
    /// Instance-wide settings.
    System,
    /// Per-user settings.
    User,
    /// Settings of one measurable (website, app...).
    Measurable {
        /// Measurable id.
        id_site: u32,
        /// Measurable type, e.g. `website`.
        id_type: String,
    },
}

/// A plugin's settings component.
pub trait PluginSettings: Send + Sync {
    /// Name of the owning plugin.
    fn plugin_name(&self) -> &str;

    /// Current values by setting name.
    fn values(&self) -> BTreeMap<String, Value>;

    /// Sets one value; takes effect on [`PluginSettings::save`].
    fn set_value(&self, setting: &str, value: Value) -> Result<()>;

    /// Persists pending values.
    fn save(&self) -> Result<()>;
}

/// Settings components by plugin name.
pub type SettingsMap = BTreeMap<String, Arc<dyn PluginSettings>>;

/// Plugin lifecycle queries the provider relies on.
pub trait PluginManager: Send + Sync {
    /// Returns true if the plugin's code is loaded.
    fn is_loaded(&self, plugin: &str) -> bool;

    /// Returns true if the plugin is activated. May fail, e.g. when the
    /// plugin's state cannot be read.
    fn is_activated(&self, plugin: &str) -> Result<bool>;

    /// Names of all activated plugins.
    fn activated_plugins(&self) -> Vec<String>;

    /// Returns the plugin's component of the given kind, if it defines one.
    fn find_component(&self, plugin: &str, kind: &SettingsKind)
        -> Option<Arc<dyn PluginSettings>>;
}

const ALL_SYSTEM_SETTINGS: &str = "AllSystemSettings";
const ALL_USER_SETTINGS: &str = "AllUserSettings";

/// Looks up settings components through a [`PluginManager`].
pub struct SettingsProvider<P> {
    plugins: P,
    language: String,
    cache: TransientCache<SettingsMap>,
}

impl<P: PluginManager> SettingsProvider<P> {
    /// Creates a provider. `language` keys the cached collections.
    pub fn new(plugins: P, language: impl Into<String>) -> Self {
        Self {
            plugins,
            language: language.into(),
            cache: TransientCache::new(),
        }
    }

    /// Returns the plugin manager.
    #[must_use]
    pub const fn plugins(&self) -> &P {
        &self.plugins
    }

    /// Returns the language the cache is keyed by.
    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Switches the display language. Entries of other languages stay
    /// cached under their own ids.
    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = language.into();
    }

    /// Drops cached collections, ending the request scope.
    pub fn flush_cache(&self) {
        self.cache.flush_all();
    }

    /// System settings of `plugin`, if it is loaded, activated and has some.
    pub fn system_settings(&self, plugin: &str) -> Option<Arc<dyn PluginSettings>> {
        self.component(plugin, &SettingsKind::System)
    }

    /// User settings of `plugin`, if it is loaded, activated and has some.
    pub fn user_settings(&self, plugin: &str) -> Option<Arc<dyn PluginSettings>> {
        self.component(plugin, &SettingsKind::User)
    }

    /// Settings of `plugin` for one measurable.
    pub fn measurable_settings(
        &self,
        plugin: &str,
        id_site: u32,
        id_type: &str,
    ) -> Option<Arc<dyn PluginSettings>> {
        self.component(
            plugin,
            &SettingsKind::Measurable {
                id_site,
                id_type: id_type.to_string(),
            },
        )
    }

    /// System settings of every activated plugin. Cached per language.
    pub fn all_system_settings(&self) -> SettingsMap {
        let id = CacheId::language_aware(ALL_SYSTEM_SETTINGS, &self.language);
        self.cache
            .get_or_insert_with(&id, || self.collect(|plugin| self.system_settings(plugin)))
    }

    /// User settings of every activated plugin. Cached per language.
    pub fn all_user_settings(&self) -> SettingsMap {
        let id = CacheId::language_aware(ALL_USER_SETTINGS, &self.language);
        self.cache
            .get_or_insert_with(&id, || self.collect(|plugin| self.user_settings(plugin)))
    }

    /// Measurable settings of every activated plugin. Not cached.
    pub fn all_measurable_settings(&self, id_site: u32, id_type: &str) -> SettingsMap {
        self.collect(|plugin| self.measurable_settings(plugin, id_site, id_type))
    }

    fn collect(&self, lookup: impl Fn(&str) -> Option<Arc<dyn PluginSettings>>) -> SettingsMap {
        self.plugins
            .activated_plugins()
            .into_iter()
            .filter_map(|plugin| lookup(&plugin).map(|settings| (plugin, settings)))
            .collect()
    }

    fn component(&self, plugin: &str, kind: &SettingsKind) -> Option<Arc<dyn PluginSettings>> {
        if !self.is_usable(plugin) {
            return None;
        }
        self.plugins.find_component(plugin, kind)
    }

    fn is_usable(&self, plugin: &str) -> bool {
        if !self.plugins.is_loaded(plugin) {
            return false;
        }
        match self.plugins.is_activated(plugin) {
            Ok(activated) => activated,
            // Settings of a plugin whose state cannot be read are not used.
            Err(e) => {
                debug!(plugin, error = %e, "Plugin activation lookup failed");
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::SettingsError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Settings backed by a map; `save` can be made to fail.
    pub(crate) struct MapSettings {
        pub(crate) plugin: String,
        pub(crate) values: Mutex<BTreeMap<String, Value>>,
        pub(crate) saved: Mutex<BTreeMap<String, Value>>,
        pub(crate) fail_save: bool,
    }

    impl MapSettings {
        pub(crate) fn new(plugin: &str, values: &[(&str, Value)]) -> Arc<Self> {
            let values: BTreeMap<String, Value> = values
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect();
            Arc::new(Self {
                plugin: plugin.to_string(),
                saved: Mutex::new(values.clone()),
                values: Mutex::new(values),
                fail_save: false,
            })
        }

        pub(crate) fn failing(plugin: &str) -> Arc<Self> {
            Arc::new(Self {
                plugin: plugin.to_string(),
                values: Mutex::new(BTreeMap::new()),
                saved: Mutex::new(BTreeMap::new()),
                fail_save: true,
            })
        }
    }

    impl PluginSettings for MapSettings {
        fn plugin_name(&self) -> &str {
            &self.plugin
        }

        fn values(&self) -> BTreeMap<String, Value> {
            self.values.lock().unwrap().clone()
        }

        fn set_value(&self, setting: &str, value: Value) -> Result<()> {
            let mut values = self.values.lock().unwrap();
            if !self.fail_save && !values.contains_key(setting) {
                return Err(SettingsError::Storage(format!(
                    "setting {setting} does not exist"
                )));
            }
            values.insert(setting.to_string(), value);
            Ok(())
        }

        fn save(&self) -> Result<()> {
            if self.fail_save {
                return Err(SettingsError::Storage("disk full".into()));
            }
            *self.saved.lock().unwrap() = self.values();
            Ok(())
        }
    }

    #[derive(Default)]
    pub(crate) struct FakePlugins {
        pub(crate) loaded: Vec<&'static str>,
        pub(crate) activated: Vec<&'static str>,
        pub(crate) broken: Vec<&'static str>,
        pub(crate) system: BTreeMap<&'static str, Arc<MapSettings>>,
        pub(crate) user: BTreeMap<&'static str, Arc<MapSettings>>,
        pub(crate) lookups: AtomicUsize,
    }

    impl PluginManager for FakePlugins {
        fn is_loaded(&self, plugin: &str) -> bool {
            self.loaded.contains(&plugin)
        }

        fn is_activated(&self, plugin: &str) -> Result<bool> {
            if self.broken.contains(&plugin) {
                return Err(SettingsError::Plugin {
                    plugin: plugin.to_string(),
                    message: "state unreadable".into(),
                });
            }
            Ok(self.activated.contains(&plugin))
        }

        fn activated_plugins(&self) -> Vec<String> {
            self.activated.iter().map(|p| (*p).to_string()).collect()
        }

        fn find_component(
            &self,
            plugin: &str,
            kind: &SettingsKind,
        ) -> Option<Arc<dyn PluginSettings>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            let found = match kind {
                SettingsKind::System => self.system.get(plugin),
                SettingsKind::User => self.user.get(plugin),
                SettingsKind::Measurable { id_site, .. } if *id_site == 1 => {
                    self.system.get(plugin)
                }
                SettingsKind::Measurable { .. } => None,
            };
            found.map(|s| Arc::clone(s) as Arc<dyn PluginSettings>)
        }
    }

    pub(crate) fn plugins() -> FakePlugins {
        let mut plugins = FakePlugins {
            loaded: vec!["Goals", "Live", "Broken", "Inactive"],
            activated: vec!["Goals", "Live", "Broken"],
            broken: vec!["Broken"],
            ..FakePlugins::default()
        };
        plugins.system.insert(
            "Goals",
            MapSettings::new("Goals", &[("enabled", Value::Bool(true))]),
        );
        plugins.system.insert(
            "Broken",
            MapSettings::new("Broken", &[("x", Value::from(1))]),
        );
        plugins.system.insert(
            "Inactive",
            MapSettings::new("Inactive", &[("x", Value::from(1))]),
        );
        plugins
            .user
            .insert("Live", MapSettings::new("Live", &[("refresh", Value::from(5))]));
        plugins
    }

    #[test]
    fn test_single_lookup_requires_loaded_and_activated() {
        let provider = SettingsProvider::new(plugins(), "en");

        assert!(provider.system_settings("Goals").is_some());
        assert!(provider.system_settings("Live").is_none());
        assert!(provider.system_settings("Inactive").is_none());
        assert!(provider.system_settings("Missing").is_none());
        // A failing activation lookup means "not usable".
        assert!(provider.system_settings("Broken").is_none());
        assert_eq!(
            provider.user_settings("Live").unwrap().plugin_name(),
            "Live"
        );
    }

    #[test]
    fn test_all_settings_are_cached_per_language() {
        let mut provider = SettingsProvider::new(plugins(), "en");

        let all = provider.all_system_settings();
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["Goals"]);
        let lookups = provider.plugins().lookups.load(Ordering::SeqCst);

        provider.all_system_settings();
        assert_eq!(provider.plugins().lookups.load(Ordering::SeqCst), lookups);

        provider.set_language("de");
        provider.all_system_settings();
        assert!(provider.plugins().lookups.load(Ordering::SeqCst) > lookups);

        provider.flush_cache();
        let before = provider.plugins().lookups.load(Ordering::SeqCst);
        assert_eq!(
            provider.all_user_settings().keys().collect::<Vec<_>>(),
            vec!["Live"]
        );
        assert!(provider.plugins().lookups.load(Ordering::SeqCst) > before);
    }

    #[test]
    fn test_measurable_settings() {
        let provider = SettingsProvider::new(plugins(), "en");

        assert!(provider.measurable_settings("Goals", 1, "website").is_some());
        assert!(provider.measurable_settings("Goals", 2, "website").is_none());
        assert_eq!(
            provider
                .all_measurable_settings(1, "website")
                .keys()
                .collect::<Vec<_>>(),
            vec!["Goals"]
        );
    }
}
