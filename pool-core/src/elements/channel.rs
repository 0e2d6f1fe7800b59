/// The last value read back from a physical channel, typed per spec §4.4's
/// per-type dispatch table (counter/timer: double; 0D: scalar; 1D/2D:
/// array; ioregister: integer; communication: string).
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelValue {
    Scalar(f64),
    Array1D(Vec<f64>),
    Array2D(Vec<Vec<f64>>),
    Integer(i64),
    Text(String),
    None,
}

/// Shared data for the physical channel-like element kinds: `CounterTimer`,
/// `ZeroD`, `OneD`, `TwoD`, `Communication`, `IORegister`. These differ only
/// in which `ChannelValue` variant their reads populate and which subset of
/// the plug-in ABI (spec §6) their controller session dispatches to; the
/// element record itself is shape-identical.
#[derive(Debug, Clone, Default)]
pub struct ChannelData {
    pub last_value: Option<ChannelValue>,
    /// Set only for `Communication` elements, tracking the `Open/Closed`
    /// substate in addition to the common `AxisState`.
    pub channel_open: bool,
}
