use bevy_ecs::schedule::SystemSet;

/// Coarse ordering of one frame. Plugin systems land in `Update` unless they ask otherwise.
#[derive(SystemSet, Clone, PartialEq, Eq, Hash, Debug)]
pub enum CoreStage {
    StartFrame,

    Update,

    EndFrame,
}
