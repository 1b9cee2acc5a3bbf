pub mod command;
pub mod console;
pub mod control_loop;
pub mod hal;
#[cfg(feature = "simulation")]
pub mod hal_sim;
pub mod sampler;
pub mod sync;
pub mod tags;
pub mod timebase;

pub use command::{Command, CommandError, ControlParameters};
pub use console::{CommandConsole, ConsoleExit};
pub use control_loop::{ControlConfig, ControlLoop, ExecutionStats, SetupError};
pub use hal::{
    ChannelConfig, GpioError, GpioPort, PinMode, PinState, Pull, SpiBus, SpiError, MAX_CHANNELS,
    NUMBER_OF_PINS,
};
#[cfg(feature = "simulation")]
pub use hal_sim::{MemoryGpio, MemorySpi};
pub use sampler::{
    Calibration, ReadingLog, ReadingSink, SensorPoller, SensorReading, TickOutcome,
};
pub use sync::{LoopSnapshot, StateExchange};
pub use timebase::TimeBase;
