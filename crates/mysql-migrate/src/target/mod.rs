//! Destination side of the pipeline.

mod publisher;

pub use publisher::{
    insert_statement, partition_size, partitions, Publisher, MAX_PARAMETERS,
};
