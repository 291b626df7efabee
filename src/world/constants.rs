/// Default world region and cell partition
pub mod region {
    /// Left boundary of the AOI region
    pub const MIN_X: i32 = 85;
    /// Right boundary of the AOI region
    pub const MAX_X: i32 = 410;
    /// Number of cells along the x axis
    pub const CNTS_X: i32 = 10;
    /// Top boundary of the AOI region (the ground-plane z axis)
    pub const MIN_Y: i32 = 75;
    /// Bottom boundary of the AOI region
    pub const MAX_Y: i32 = 400;
    /// Number of cells along the y axis
    pub const CNTS_Y: i32 = 20;
}

/// Spawn policy: a fixed anchor plus a small random offset
pub mod spawn {
    /// Spawn anchor on the x axis
    pub const ANCHOR_X: f32 = 160.0;
    /// Spawn anchor on the z axis
    pub const ANCHOR_Z: f32 = 134.0;
    /// Random offset range on x, `[0, JITTER_X)`
    pub const JITTER_X: u32 = 10;
    /// Random offset range on z, `[0, JITTER_Z)`
    pub const JITTER_Z: u32 = 17;
}

/// Identity assignment
pub mod identity {
    /// First entity id handed out by the allocator
    pub const FIRST_ENTITY_ID: u32 = 1;
}

/// Network boundary constants
pub mod net {
    /// Default TCP port for the game protocol
    pub const DEFAULT_PORT: u16 = 12121;
    /// Default port for the metrics endpoint
    pub const DEFAULT_METRICS_PORT: u16 = 9090;
    /// Maximum frame payload accepted from a client (bytes)
    pub const MAX_MESSAGE_SIZE: usize = 16 * 1024;
    /// Default cap on simultaneous connections
    pub const DEFAULT_MAX_CONNECTIONS: usize = 1000;
    /// Maximum chat text length in bytes, longer messages are truncated
    pub const MAX_CHAT_LEN: usize = 512;
}

/// Capacity hints
pub mod capacity {
    /// Initial capacity of a cell's member set
    pub const CELL_INITIAL_CAPACITY: usize = 8;
    /// Initial capacity of the entity registry
    pub const REGISTRY_INITIAL_CAPACITY: usize = 64;
}
