//! Capture-file persistence: decoded packets in, pcap files out, and
//! back again. Written capture files are made world read/writable so
//! post-run tooling (wireshark on a developer machine, scp as a normal
//! user) can pick them up regardless of which account ran the harness.

use std::fs::{self, File};
use std::path::Path;
use std::time::Duration;

use log::debug;
use pcap_file::pcap::{PcapPacket, PcapReader, PcapWriter};

use crate::error_handling::types::CaptureError;

use super::decode::decode_frame;
use super::types::Packet;

/// Reads and decodes every packet of a pcap file, in capture order.
pub fn read_pcap(path: &Path) -> Result<Vec<Packet>, CaptureError> {
    let file = File::open(path)?;
    let mut reader =
        PcapReader::new(file).map_err(|e| CaptureError::PcapReadFailed(e.to_string()))?;

    let mut packets = Vec::new();
    while let Some(next) = reader.next_packet() {
        let record = next.map_err(|e| CaptureError::PcapReadFailed(e.to_string()))?;
        packets.push(decode_frame(record.timestamp.as_secs_f64(), &record.data));
    }
    debug!("Read {} packets from {}", packets.len(), path.display());
    Ok(packets)
}

/// Writes packets to a pcap file (created/truncated) and chmods it 0o666.
pub fn write_pcap(path: &Path, packets: &[Packet]) -> Result<(), CaptureError> {
    let file = File::create(path)?;
    let mut writer =
        PcapWriter::new(file).map_err(|e| CaptureError::PcapWriteFailed(e.to_string()))?;

    for pkt in packets {
        let ts = Duration::from_secs_f64(pkt.timestamp.max(0.0));
        let record = PcapPacket::new(ts, pkt.raw.len() as u32, &pkt.raw);
        writer
            .write_packet(&record)
            .map_err(|e| CaptureError::PcapWriteFailed(e.to_string()))?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o666))?;
    }

    debug!("Wrote {} packets to {}", packets.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet_model::types::{FieldValue, LayerKind};
    use etherparse::PacketBuilder;

    fn echo_frame(seq: u16) -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([0; 6], [1; 6])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .icmpv4_echo_request(7, seq);
        let mut frame = Vec::with_capacity(builder.size(0));
        builder.write(&mut frame, &[]).unwrap();
        frame
    }

    #[test]
    fn written_capture_reads_back_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("va0_GP.pcap");

        let packets: Vec<_> = (1u16..=3)
            .map(|seq| decode_frame(seq as f64, &echo_frame(seq)))
            .collect();
        write_pcap(&path, &packets).unwrap();

        let read_back = read_pcap(&path).unwrap();
        assert_eq!(read_back.len(), 3);
        assert_eq!(
            read_back[1].layer(LayerKind::Icmpv4).unwrap().field("seq"),
            Some(&FieldValue::Uint(2))
        );
        assert!((read_back[2].timestamp - 3.0).abs() < 1e-3);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o666);
        }
    }

    #[test]
    fn empty_capture_roundtrips_to_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pcap");
        write_pcap(&path, &[]).unwrap();
        assert!(read_pcap(&path).unwrap().is_empty());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(read_pcap(Path::new("/nonexistent/x.pcap")).is_err());
    }
}
