pub mod http_queue;

pub use http_queue::HttpQueueSource;
