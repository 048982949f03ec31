pub use crate::retry::reconnection_policy::{
    ConstantReconnectionPolicy, ExponentialReconnectionPolicy, NeverReconnectionPolicy,
    ReconnectionPolicy, ReconnectionSchedule,
};

mod reconnection_policy;
