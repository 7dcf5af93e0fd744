pub mod report_writer;
pub mod sale_reader;
