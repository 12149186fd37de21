use std::any::TypeId;

use bevy_ecs::{
    schedule::{IntoSystemConfig, SystemSet},
    system::Resource,
};

use crate::{app::App, core_stage::CoreStage};

/// Modeled after https://docs.rs/bevy/latest/bevy/app/trait.Plugin.html
/// Remember to properly expose your own plugin system sets to the outside world.
pub trait Plugin: 'static {
    /// Called once when the plugin is added to an App.
    fn build(&mut self, app: &mut PluginAppAccess);

    fn system_set() -> PluginSet
    where
        Self: Sized,
    {
        PluginSet(TypeId::of::<Self>())
    }
}

/// Every plugin has at least one system set, otherwise the systems of that plugin could become poor homeless orphans.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct PluginSet(TypeId);

pub struct PluginAppAccess<'app> {
    app: &'app mut App,
    system_set: PluginSet,
}

impl<'app> PluginAppAccess<'app> {
    pub(super) fn new<T: Plugin>(app: &'app mut App) -> Self {
        Self {
            app,
            system_set: T::system_set(),
        }
    }

    pub fn with_resource<T>(&mut self, resource: T) -> &mut Self
    where
        T: Resource,
    {
        self.app.world.insert_resource(resource);
        self
    }

    /// Adds a frame system in the `CoreStage::Update` stage.
    pub fn with_system<Params>(&mut self, system: impl IntoSystemConfig<Params>) -> &mut Self {
        self.with_staged_system(CoreStage::Update, system)
    }

    pub fn with_staged_system<Params>(
        &mut self,
        stage: CoreStage,
        system: impl IntoSystemConfig<Params>,
    ) -> &mut Self {
        self.app
            .schedule
            .add_system(system.in_set(self.system_set.clone()).in_set(stage));
        self
    }

    pub fn with_plugin<T>(&mut self, plugin: T) -> &mut Self
    where
        T: Plugin,
    {
        self.app.with_plugin(plugin);
        self
    }
}
