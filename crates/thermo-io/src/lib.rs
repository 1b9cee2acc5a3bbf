pub mod gpio_file;
pub mod lock;
pub mod metrics;
pub mod spi_file;

pub use gpio_file::{FileGpio, DEFAULT_IMAGE_PATH};
pub use lock::LockedFile;
pub use metrics::{init_metrics, record_snapshot, serve_metrics};
pub use spi_file::{
    channel_path, remove_channel_source, write_channel_source, FileSpi, DEFAULT_SPI_DIR,
};
