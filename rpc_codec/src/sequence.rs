//! Packed sequences and remote array descriptors

use crate::{ByteCounter, ByteSink, ByteSource, WireError};
use packet_arena::{Arena, PageAllocator};
use rpc_types::{ArgValue, RemoteArray, TypeCode};

/// Reads a `u64`-length-prefixed byte buffer into the arena
pub fn read_blob<'a, S, A>(src: &mut S, arena: &'a Arena<A>) -> Result<&'a [u8], WireError>
where
    S: ByteSource + ?Sized,
    A: PageAllocator,
{
    let len = src.read_u64()?;
    let len = usize::try_from(len)
        .map_err(|_| WireError::check(format!("buffer length {} does not fit in memory", len)))?;
    let buf = arena.alloc_slice::<u8>(len)?;
    src.read_bytes(buf)?;
    Ok(buf)
}

/// Reads a remote array descriptor; extents land in the arena
pub fn read_array_descriptor<'a, S, A>(
    src: &mut S,
    arena: &'a Arena<A>,
) -> Result<RemoteArray<'a>, WireError>
where
    S: ByteSource + ?Sized,
    A: PageAllocator,
{
    let data = src.read_u64()?;
    let device = src.read_device()?;
    let ndim = src.read_i32()?;
    let ndim = usize::try_from(ndim)
        .map_err(|_| WireError::check(format!("negative ndim {}", ndim)))?;
    let dtype = src.read_dtype()?;

    let shape = arena.alloc_slice::<i64>(ndim)?;
    for extent in shape.iter_mut() {
        *extent = src.read_i64()?;
    }
    let byte_offset = src.read_u64()?;

    Ok(RemoteArray {
        data,
        device,
        dtype,
        shape,
        byte_offset,
    })
}

/// Writes a remote array descriptor
pub fn write_array_descriptor<S>(sink: &mut S, array: &RemoteArray<'_>) -> Result<(), WireError>
where
    S: ByteSink + ?Sized,
{
    let ndim = i32::try_from(array.shape.len())
        .map_err(|_| WireError::check(format!("ndim {} out of range", array.shape.len())))?;
    sink.write_u64(array.data)?;
    sink.write_device(array.device)?;
    sink.write_i32(ndim)?;
    sink.write_dtype(array.dtype)?;
    for &extent in array.shape {
        sink.write_i64(extent)?;
    }
    sink.write_u64(array.byte_offset)
}

fn decode_value<'a, S, A>(
    src: &mut S,
    raw: i32,
    arena: &'a Arena<A>,
) -> Result<ArgValue<'a>, WireError>
where
    S: ByteSource + ?Sized,
    A: PageAllocator,
{
    let code = TypeCode::try_from(raw).map_err(|_| WireError::UnknownTypeCode(raw))?;
    let value = match code {
        TypeCode::Int => ArgValue::Int(src.read_i64()?),
        TypeCode::UInt => ArgValue::UInt(src.read_u64()?),
        TypeCode::Float => ArgValue::Float(src.read_f64()?),
        TypeCode::OpaqueHandle => ArgValue::Handle(src.read_u64()?),
        TypeCode::Null => ArgValue::Null,
        TypeCode::DataType => ArgValue::DataType(src.read_dtype()?),
        TypeCode::Device => ArgValue::Device(src.read_device()?),
        TypeCode::DeviceTensorHandle => ArgValue::Array(read_array_descriptor(src, arena)?),
        TypeCode::ModuleHandle => ArgValue::Module(src.read_u64()?),
        TypeCode::PackedFuncHandle => ArgValue::Func(src.read_u64()?),
        TypeCode::Str => {
            let bytes = read_blob(src, arena)?;
            let text = std::str::from_utf8(bytes)
                .map_err(|err| WireError::check(format!("string argument: {}", err)))?;
            ArgValue::Str(text)
        }
        TypeCode::Bytes => ArgValue::Bytes(read_blob(src, arena)?),
        TypeCode::ObjectHandle | TypeCode::NDArrayHandle => {
            return Err(WireError::InvalidTypeCode { code })
        }
    };
    Ok(value)
}

/// Decodes a packed sequence
///
/// Type codes are read in full before any payload. The returned slice and
/// everything it borrows live in the arena until the next recycle.
pub fn decode_sequence<'a, S, A>(
    src: &mut S,
    arena: &'a Arena<A>,
) -> Result<&'a [ArgValue<'a>], WireError>
where
    S: ByteSource + ?Sized,
    A: PageAllocator,
{
    let num_args = src.read_i32()?;
    let count = usize::try_from(num_args)
        .map_err(|_| WireError::check(format!("negative argument count {}", num_args)))?;

    let tcodes = arena.alloc_slice::<i32>(count)?;
    for tcode in tcodes.iter_mut() {
        *tcode = src.read_i32()?;
    }

    let values = arena.alloc_filled(count, ArgValue::Null)?;
    for (slot, &raw) in values.iter_mut().zip(tcodes.iter()) {
        *slot = decode_value(src, raw, arena)?;
    }
    Ok(values)
}

fn encode_value<S>(sink: &mut S, value: &ArgValue<'_>) -> Result<(), WireError>
where
    S: ByteSink + ?Sized,
{
    match *value {
        ArgValue::Int(v) => sink.write_i64(v),
        ArgValue::UInt(v) => sink.write_u64(v),
        ArgValue::Float(v) => sink.write_f64(v),
        ArgValue::Handle(v) | ArgValue::Module(v) | ArgValue::Func(v) => sink.write_u64(v),
        ArgValue::Null => Ok(()),
        ArgValue::DataType(dtype) => sink.write_dtype(dtype),
        ArgValue::Device(device) => sink.write_device(device),
        ArgValue::Array(ref array) => write_array_descriptor(sink, array),
        ArgValue::Str(text) => sink.write_blob(text.as_bytes()),
        ArgValue::Bytes(bytes) => sink.write_blob(bytes),
    }
}

/// Encodes a packed sequence
pub fn encode_sequence<S>(sink: &mut S, values: &[ArgValue<'_>]) -> Result<(), WireError>
where
    S: ByteSink + ?Sized,
{
    let num_args = i32::try_from(values.len())
        .map_err(|_| WireError::check(format!("{} values do not fit a sequence", values.len())))?;
    sink.write_i32(num_args)?;
    for value in values {
        sink.write_i32(value.type_code().as_i32())?;
    }
    for value in values {
        encode_value(sink, value)?;
    }
    Ok(())
}

/// Exact encoded size of a packed sequence
pub fn sequence_nbytes(values: &[ArgValue<'_>]) -> Result<u64, WireError> {
    let mut counter = ByteCounter::new();
    encode_sequence(&mut counter, values)?;
    Ok(counter.count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpc_types::{DataType, Device, DeviceType};

    fn round_trip(values: &[ArgValue<'_>]) {
        let mut wire = Vec::new();
        encode_sequence(&mut wire, values).unwrap();
        assert_eq!(wire.len() as u64, sequence_nbytes(values).unwrap());

        let arena: Arena = Arena::default();
        let mut src = wire.as_slice();
        let decoded = decode_sequence(&mut src, &arena).unwrap();
        assert!(src.is_empty());
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_round_trip_every_tag() {
        let shape = [2, 3, 4];
        let array = RemoteArray::new(0x4000, Device::cuda(1), DataType::float(32), &shape)
            .with_byte_offset(128);
        round_trip(&[
            ArgValue::Int(-42),
            ArgValue::UInt(u64::MAX),
            ArgValue::Float(1.5),
            ArgValue::Handle(0xDEAD_BEEF),
            ArgValue::Null,
            ArgValue::DataType(DataType::uint(8)),
            ArgValue::Device(Device::new(DeviceType(99), 7)),
            ArgValue::Array(array),
            ArgValue::Module(11),
            ArgValue::Func(12),
            ArgValue::Str("hello"),
            ArgValue::Bytes(&[0, 1, 2, 255]),
        ]);
    }

    #[test]
    fn test_round_trip_empty_payloads() {
        round_trip(&[]);
        round_trip(&[ArgValue::Str(""), ArgValue::Bytes(&[])]);
        round_trip(&[ArgValue::Array(RemoteArray::new(
            0,
            Device::cpu(),
            DataType::int(8),
            &[],
        ))]);
    }

    #[test]
    fn test_null_has_no_payload() {
        let mut wire = Vec::new();
        encode_sequence(&mut wire, &[ArgValue::Null]).unwrap();
        assert_eq!(wire, vec![1, 0, 0, 0, 4, 0, 0, 0]);
    }

    #[test]
    fn test_descriptor_layout() {
        let shape = [16];
        let array = RemoteArray::new(0x1000, Device::cpu(), DataType::float(32), &shape)
            .with_byte_offset(64);
        let mut wire = Vec::new();
        write_array_descriptor(&mut wire, &array).unwrap();
        assert_eq!(wire.len(), array.wire_size());
        assert_eq!(&wire[..8], &0x1000u64.to_le_bytes());
        assert_eq!(&wire[16..20], &1i32.to_le_bytes());
        assert_eq!(&wire[wire.len() - 8..], &64u64.to_le_bytes());
    }

    #[test]
    fn test_negative_count_is_check_error() {
        let wire = (-1i32).to_le_bytes();
        let arena: Arena = Arena::default();
        let err = decode_sequence(&mut &wire[..], &arena).unwrap_err();
        assert!(matches!(err, WireError::Check(_)));
    }

    #[test]
    fn test_rejected_tags() {
        let arena: Arena = Arena::default();
        for (tag, expected) in [
            (8, WireError::InvalidTypeCode { code: TypeCode::ObjectHandle }),
            (13, WireError::InvalidTypeCode { code: TypeCode::NDArrayHandle }),
            (42, WireError::UnknownTypeCode(42)),
        ] {
            let mut wire = Vec::new();
            wire.write_i32(1).unwrap();
            wire.write_i32(tag).unwrap();
            wire.write_u64(0).unwrap();
            let err = decode_sequence(&mut wire.as_slice(), &arena).unwrap_err();
            assert_eq!(err, expected);
        }
    }

    #[test]
    fn test_invalid_utf8_is_check_error() {
        let mut wire = Vec::new();
        wire.write_i32(1).unwrap();
        wire.write_i32(TypeCode::Str.as_i32()).unwrap();
        wire.write_blob(&[0xFF, 0xFE]).unwrap();
        let arena: Arena = Arena::default();
        let err = decode_sequence(&mut wire.as_slice(), &arena).unwrap_err();
        assert!(matches!(err, WireError::Check(_)));
    }

    #[test]
    fn test_negative_ndim_is_check_error() {
        let mut wire = Vec::new();
        wire.write_u64(0).unwrap();
        wire.write_device(Device::cpu()).unwrap();
        wire.write_i32(-2).unwrap();
        wire.write_dtype(DataType::int(32)).unwrap();
        let arena: Arena = Arena::default();
        let err = read_array_descriptor(&mut wire.as_slice(), &arena).unwrap_err();
        assert!(matches!(err, WireError::Check(_)));
    }

    #[test]
    fn test_truncated_payload_is_read_error() {
        let mut wire = Vec::new();
        encode_sequence(&mut wire, &[ArgValue::Str("truncated")]).unwrap();
        wire.truncate(wire.len() - 3);
        let arena: Arena = Arena::default();
        let err = decode_sequence(&mut wire.as_slice(), &arena).unwrap_err();
        assert!(matches!(err, WireError::Read(_)));
    }

    #[test]
    fn test_decode_exhausts_limited_arena() {
        let mut wire = Vec::new();
        encode_sequence(&mut wire, &[ArgValue::Bytes(&[7u8; 300])]).unwrap();
        let arena = Arena::new(packet_arena::HeapPageAllocator::new(64).with_limit(128));
        let err = decode_sequence(&mut wire.as_slice(), &arena).unwrap_err();
        assert!(matches!(err, WireError::Arena(_)));
    }
}
