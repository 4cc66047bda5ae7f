//! Matchmaking - finding, creating and reaping rooms

pub mod directory;

pub use directory::RoomDirectory;
