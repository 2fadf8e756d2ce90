pub mod operation_reader;
pub mod operation_runner;
pub mod report_writer;
