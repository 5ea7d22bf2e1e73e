pub mod decode;
pub mod live;
pub mod pcap_io;
pub mod types;
