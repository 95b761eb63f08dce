pub mod sweep_io;
