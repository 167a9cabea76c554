// Pipeline storage: publishing star-schema partitions

pub mod partition;

pub use partition::{CsvPartitionWriter, OutputPartition, PartitionSink};
