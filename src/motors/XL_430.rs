//! Definition of the X-series (`XL430`/`XC430`) protocol 2.0 registers.
//!
//! `PresentLoad`, `PresentVelocity` and `PresentPosition` are adjacent in
//! this order, which is what lets a single sync read cover all three. Other
//! device families must be checked before reusing [`TELEMETRY_SPAN`].

register![
    /// Torque enable flag (0 = off, 1 = on).
    TorqueEnable: 64, 1,
    /// Goal position.
    GoalPosition: 116, 4,
    /// Present load, signed, 0.1 % of max torque per unit.
    PresentLoad: 126, 2,
    /// Present velocity, signed.
    PresentVelocity: 128, 4,
    /// Present position, signed.
    PresentPosition: 132, 4,
];

/// Bytes covered by one telemetry read, from `PresentLoad` through `PresentPosition`.
pub const TELEMETRY_SPAN: u16 =
    PresentPosition::ADDRESS + PresentPosition::LENGTH - PresentLoad::ADDRESS;

/// Value written to `TorqueEnable` to engage the motor.
pub const TORQUE_ON: u8 = 1;
/// Value written to `TorqueEnable` to release the motor.
pub const TORQUE_OFF: u8 = 0;
