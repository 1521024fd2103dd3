use crate::commitlog::{Epoch, LogEntry, Offset};
use crate::follower::Ack;
use crate::grpc::{ProtoAck, ProtoLogEntry};
use crate::rpc::RpcError;
use std::convert::TryFrom;
use tonic::Status;

// The wire uses int32 for offsets and epochs. Negative values have no meaning.

pub(crate) fn offset_from_proto(offset: i32) -> Result<Offset, Status> {
    u32::try_from(offset)
        .map(Offset::new)
        .map_err(|_| Status::invalid_argument(format!("Offset must be non-negative, got {}", offset)))
}

pub(crate) fn epoch_from_proto(epoch: i32) -> Result<Epoch, Status> {
    u32::try_from(epoch)
        .map(Epoch::new)
        .map_err(|_| Status::invalid_argument(format!("Epoch must be non-negative, got {}", epoch)))
}

pub(crate) fn log_entry_from_proto(proto_entry: ProtoLogEntry) -> Result<LogEntry, Status> {
    Ok(LogEntry {
        epoch: epoch_from_proto(proto_entry.epoch)?,
        offset: offset_from_proto(proto_entry.offset)?,
        data: proto_entry.data,
        committed: proto_entry.committed,
    })
}

pub(crate) fn offset_to_proto(offset: Offset) -> Result<i32, RpcError> {
    i32::try_from(offset.as_u32()).map_err(|_| RpcError::OutOfRange(format!("offset {:?}", offset)))
}

pub(crate) fn epoch_to_proto(epoch: Epoch) -> Result<i32, RpcError> {
    i32::try_from(epoch.as_u32()).map_err(|_| RpcError::OutOfRange(format!("epoch {:?}", epoch)))
}

pub(crate) fn log_entry_to_proto(entry: LogEntry) -> Result<ProtoLogEntry, RpcError> {
    Ok(ProtoLogEntry {
        epoch: epoch_to_proto(entry.epoch)?,
        offset: offset_to_proto(entry.offset)?,
        data: entry.data,
        committed: entry.committed,
    })
}

pub(crate) fn ack_from_proto(proto_ack: ProtoAck) -> Ack {
    Ack {
        success: proto_ack.success,
        message: proto_ack.message,
    }
}

pub(crate) fn ack_to_proto(ack: Ack) -> ProtoAck {
    ProtoAck {
        success: ack.success,
        message: ack.message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn negative_offset_is_invalid_argument() {
        let status = offset_from_proto(-1).unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[test]
    fn negative_epoch_in_entry_is_invalid_argument() {
        let proto_entry = ProtoLogEntry {
            epoch: -3,
            offset: 0,
            data: "x".into(),
            committed: false,
        };

        let status = log_entry_from_proto(proto_entry).unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[test]
    fn entry_fields_survive_the_wire() {
        let entry = LogEntry {
            epoch: Epoch::new(2),
            offset: Offset::new(7),
            data: "payload".into(),
            committed: true,
        };

        let proto_entry = log_entry_to_proto(entry.clone()).unwrap();
        assert_eq!(log_entry_from_proto(proto_entry).unwrap(), entry);
    }

    #[test]
    fn values_past_int32_never_wrap_on_the_wire() {
        let entry = LogEntry {
            epoch: Epoch::new(3_000_000_000),
            offset: Offset::new(0),
            data: "x".into(),
            committed: false,
        };
        assert!(matches!(log_entry_to_proto(entry), Err(RpcError::OutOfRange(_))));

        assert!(matches!(
            offset_to_proto(Offset::new(i32::MAX as u32 + 1)),
            Err(RpcError::OutOfRange(_))
        ));
        assert_eq!(offset_to_proto(Offset::new(i32::MAX as u32)).unwrap(), i32::MAX);
        assert_eq!(epoch_to_proto(Epoch::new(i32::MAX as u32)).unwrap(), i32::MAX);
    }
}
