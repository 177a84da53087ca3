mod file_result_exporter;

pub use file_result_exporter::FileResultExporter;
