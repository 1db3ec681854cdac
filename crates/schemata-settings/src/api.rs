//! Reading and saving plugin settings in bulk.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{Result, SettingsError};
use crate::provider::{PluginManager, PluginSettings, SettingsMap, SettingsProvider};

/// Values to save, by plugin name then setting name.
pub type SettingValues = BTreeMap<String, BTreeMap<String, Value>>;

/// One setting as exposed to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingView {
    /// Setting name.
    pub name: String,
    /// Current value.
    pub value: Value,
}

/// A plugin's settings as exposed to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSettingsView {
    /// Plugin name.
    pub plugin_name: String,
    /// Settings in name order.
    pub settings: Vec<SettingView>,
}

impl PluginSettingsView {
    fn of(settings: &dyn PluginSettings) -> Self {
        Self {
            plugin_name: settings.plugin_name().to_string(),
            settings: settings
                .values()
                .into_iter()
                .map(|(name, value)| SettingView { name, value })
                .collect(),
        }
    }
}

/// Settings operations exposed to clients.
pub struct SettingsApi<P> {
    provider: SettingsProvider<P>,
}

impl<P: PluginManager> SettingsApi<P> {
    /// Creates the API over `provider`.
    pub const fn new(provider: SettingsProvider<P>) -> Self {
        Self { provider }
    }

    /// Returns the underlying provider.
    pub const fn provider(&self) -> &SettingsProvider<P> {
        &self.provider
    }

    /// Returns the underlying provider mutably, e.g. to switch language.
    pub fn provider_mut(&mut self) -> &mut SettingsProvider<P> {
        &mut self.provider
    }

    /// Saves system settings of several plugins.
    pub fn set_system_settings(&self, values: &SettingValues) -> Result<()> {
        save(values, &self.provider.all_system_settings())
    }

    /// Saves the current user's settings of several plugins.
    pub fn set_user_settings(&self, values: &SettingValues) -> Result<()> {
        save(values, &self.provider.all_user_settings())
    }

    /// System settings of every activated plugin.
    pub fn system_settings(&self) -> Vec<PluginSettingsView> {
        views(&self.provider.all_system_settings())
    }

    /// The current user's settings of every activated plugin.
    pub fn user_settings(&self) -> Vec<PluginSettingsView> {
        views(&self.provider.all_user_settings())
    }
}

/// Applies every value, then saves every component of `settings`.
///
/// A plugin without a component in `settings` or a rejected value fails
/// before anything is saved. A failing save is logged and reported as
/// [`SettingsError::SaveFailed`].
fn save(values: &SettingValues, settings: &SettingsMap) -> Result<()> {
    for (plugin, plugin_values) in values {
        let component = settings.get(plugin).ok_or_else(|| SettingsError::Plugin {
            plugin: plugin.clone(),
            message: "no settings available".into(),
        })?;
        for (name, value) in plugin_values {
            component.set_value(name, value.clone())?;
        }
    }

    for component in settings.values() {
        if let Err(e) = component.save() {
            error!(plugin = component.plugin_name(), error = %e, "Saving settings failed");
            return Err(SettingsError::SaveFailed);
        }
        debug!(plugin = component.plugin_name(), "Settings saved");
    }
    Ok(())
}

fn views(settings: &SettingsMap) -> Vec<PluginSettingsView> {
    settings
        .values()
        .map(|component| PluginSettingsView::of(component.as_ref()))
        .collect()
}
