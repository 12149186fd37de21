use bevy_ecs::{
    schedule::{ExecutorKind, IntoSystemConfig, IntoSystemSetConfigs, Schedule},
    world::World,
};

use crate::{
    core_stage::CoreStage,
    plugin::{Plugin, PluginAppAccess},
};

/// See https://docs.rs/bevy/latest/bevy/app/struct.App.html
pub struct App {
    pub world: World,
    pub schedule: Schedule,
}

impl App {
    pub fn new() -> Self {
        let mut schedule = Schedule::default();
        schedule.configure_sets(
            (CoreStage::StartFrame, CoreStage::Update, CoreStage::EndFrame).chain(),
        );
        schedule.set_executor_kind(ExecutorKind::SingleThreaded);

        Self {
            world: World::new(),
            schedule,
        }
    }

    pub fn with_plugin<T>(&mut self, mut plugin: T) -> &mut Self
    where
        T: Plugin,
    {
        plugin.build(&mut PluginAppAccess::new::<T>(self));
        self
    }

    pub fn with_system<Params>(&mut self, system: impl IntoSystemConfig<Params>) -> &mut Self {
        self.schedule.add_system(system);
        self
    }

    /// Runs every frame system once.
    pub fn update(&mut self) {
        self.schedule.run(&mut self.world);
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy_ecs::prelude::*;

    #[derive(Resource, Default)]
    struct Trace(Vec<&'static str>);

    fn start(mut trace: ResMut<Trace>) {
        trace.0.push("start");
    }

    fn update(mut trace: ResMut<Trace>) {
        trace.0.push("update");
    }

    fn end(mut trace: ResMut<Trace>) {
        trace.0.push("end");
    }

    #[test]
    fn test_stages_run_in_order() {
        let mut app = App::new();
        app.world.insert_resource(Trace::default());
        app.with_system(end.in_set(CoreStage::EndFrame))
            .with_system(update.in_set(CoreStage::Update))
            .with_system(start.in_set(CoreStage::StartFrame));

        app.update();
        app.update();

        assert_eq!(
            app.world.resource::<Trace>().0,
            vec!["start", "update", "end", "start", "update", "end"]
        );
    }
}
