pub mod events;
pub mod process_manager;
pub mod registry;
pub mod spawner;
pub mod stop;
