//! Arrow type vocabulary for the C Data Interface
//!
//! Two views of the host type enumeration: the format string a type carries
//! in the C Data Interface ABI, and the fixed byte width of its values
//! buffer when it has one. Schemas accepted by a store must pass both.

use arrow::datatypes::{DataType, IntervalUnit, TimeUnit, UnionMode};

use crate::{Result, StoreError};

/// C Data Interface format string for `dt`.
///
/// Covers the full vocabulary of the ABI; dictionary types map to the format
/// of their key type and run-end encoded types to `+r`.
pub fn c_data_format(dt: &DataType) -> Result<String> {
    let fmt: String = match dt {
        DataType::Null => "n".into(),
        DataType::Boolean => "b".into(),
        DataType::Int8 => "c".into(),
        DataType::UInt8 => "C".into(),
        DataType::Int16 => "s".into(),
        DataType::UInt16 => "S".into(),
        DataType::Int32 => "i".into(),
        DataType::UInt32 => "I".into(),
        DataType::Int64 => "l".into(),
        DataType::UInt64 => "L".into(),
        DataType::Float16 => "e".into(),
        DataType::Float32 => "f".into(),
        DataType::Float64 => "g".into(),
        DataType::Utf8 => "u".into(),
        DataType::LargeUtf8 => "U".into(),
        DataType::Utf8View => "vu".into(),
        DataType::Binary => "z".into(),
        DataType::LargeBinary => "Z".into(),
        DataType::BinaryView => "vz".into(),
        DataType::FixedSizeBinary(width) => format!("w:{width}"),
        DataType::Date32 => "tdD".into(),
        DataType::Date64 => "tdm".into(),
        DataType::Time32(TimeUnit::Second) => "tts".into(),
        DataType::Time32(TimeUnit::Millisecond) => "ttm".into(),
        DataType::Time64(TimeUnit::Microsecond) => "ttu".into(),
        DataType::Time64(TimeUnit::Nanosecond) => "ttn".into(),
        DataType::Timestamp(unit, tz) => {
            let tz = tz.as_deref().unwrap_or("");
            format!("ts{}:{tz}", unit_code(*unit))
        }
        DataType::Duration(unit) => format!("tD{}", unit_code(*unit)),
        DataType::Interval(IntervalUnit::YearMonth) => "tiM".into(),
        DataType::Interval(IntervalUnit::DayTime) => "tiD".into(),
        DataType::Interval(IntervalUnit::MonthDayNano) => "tin".into(),
        DataType::Decimal32(precision, scale) => format!("d:{precision},{scale},32"),
        DataType::Decimal64(precision, scale) => format!("d:{precision},{scale},64"),
        DataType::Decimal128(precision, scale) => format!("d:{precision},{scale}"),
        DataType::Decimal256(precision, scale) => format!("d:{precision},{scale},256"),
        DataType::List(_) => "+l".into(),
        DataType::LargeList(_) => "+L".into(),
        DataType::ListView(_) => "+vl".into(),
        DataType::LargeListView(_) => "+vL".into(),
        DataType::FixedSizeList(_, len) => format!("+w:{len}"),
        DataType::Struct(_) => "+s".into(),
        DataType::Map(_, _) => "+m".into(),
        DataType::Union(fields, mode) => {
            let ids = fields
                .iter()
                .map(|(id, _)| id.to_string())
                .collect::<Vec<_>>()
                .join(",");
            match mode {
                UnionMode::Sparse => format!("+us:{ids}"),
                UnionMode::Dense => format!("+ud:{ids}"),
            }
        }
        DataType::Dictionary(key, _) => return c_data_format(key),
        DataType::RunEndEncoded(_, _) => "+r".into(),
        other => {
            return Err(StoreError::InvalidArgument(format!(
                "no C Data Interface format for {other}"
            )))
        }
    };
    Ok(fmt)
}

fn unit_code(unit: TimeUnit) -> &'static str {
    match unit {
        TimeUnit::Second => "s",
        TimeUnit::Millisecond => "m",
        TimeUnit::Microsecond => "u",
        TimeUnit::Nanosecond => "n",
    }
}

/// Fixed byte width of `dt`'s values buffer, when the store can lay it out.
///
/// `Some` exactly for the single-buffer fixed-width types: integers, floats,
/// dates, times, timestamps, durations, intervals, decimals and fixed-size
/// binary. Boolean is bit packed rather than byte addressable, so it is not
/// accepted in store schemas; variable-width and nested types have no fixed
/// width at all.
pub fn fixed_byte_width(dt: &DataType) -> Option<usize> {
    match dt {
        DataType::Int8 | DataType::UInt8 => Some(1),
        DataType::Int16 | DataType::UInt16 | DataType::Float16 => Some(2),
        DataType::Int32
        | DataType::UInt32
        | DataType::Float32
        | DataType::Date32
        | DataType::Time32(_)
        | DataType::Interval(IntervalUnit::YearMonth)
        | DataType::Decimal32(_, _) => Some(4),
        DataType::Int64
        | DataType::UInt64
        | DataType::Float64
        | DataType::Date64
        | DataType::Time64(_)
        | DataType::Timestamp(_, _)
        | DataType::Duration(_)
        | DataType::Interval(IntervalUnit::DayTime)
        | DataType::Decimal64(_, _) => Some(8),
        DataType::Interval(IntervalUnit::MonthDayNano) | DataType::Decimal128(_, _) => Some(16),
        DataType::Decimal256(_, _) => Some(32),
        DataType::FixedSizeBinary(width) => Some(*width as usize),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::Field;
    use std::sync::Arc;

    #[test]
    fn test_primitive_formats() {
        assert_eq!(c_data_format(&DataType::Null).unwrap(), "n");
        assert_eq!(c_data_format(&DataType::Boolean).unwrap(), "b");
        assert_eq!(c_data_format(&DataType::Int8).unwrap(), "c");
        assert_eq!(c_data_format(&DataType::UInt8).unwrap(), "C");
        assert_eq!(c_data_format(&DataType::Int32).unwrap(), "i");
        assert_eq!(c_data_format(&DataType::UInt64).unwrap(), "L");
        assert_eq!(c_data_format(&DataType::Float16).unwrap(), "e");
        assert_eq!(c_data_format(&DataType::Float64).unwrap(), "g");
    }

    #[test]
    fn test_temporal_formats() {
        assert_eq!(c_data_format(&DataType::Date32).unwrap(), "tdD");
        assert_eq!(c_data_format(&DataType::Date64).unwrap(), "tdm");
        assert_eq!(
            c_data_format(&DataType::Time32(TimeUnit::Second)).unwrap(),
            "tts"
        );
        assert_eq!(
            c_data_format(&DataType::Time64(TimeUnit::Nanosecond)).unwrap(),
            "ttn"
        );
        assert_eq!(
            c_data_format(&DataType::Timestamp(TimeUnit::Microsecond, None)).unwrap(),
            "tsu:"
        );
        assert_eq!(
            c_data_format(&DataType::Timestamp(
                TimeUnit::Second,
                Some("UTC".into())
            ))
            .unwrap(),
            "tss:UTC"
        );
        assert_eq!(
            c_data_format(&DataType::Duration(TimeUnit::Millisecond)).unwrap(),
            "tDm"
        );
        assert_eq!(
            c_data_format(&DataType::Interval(IntervalUnit::MonthDayNano)).unwrap(),
            "tin"
        );
    }

    #[test]
    fn test_decimal_formats() {
        assert_eq!(c_data_format(&DataType::Decimal32(9, 2)).unwrap(), "d:9,2,32");
        assert_eq!(c_data_format(&DataType::Decimal64(18, 4)).unwrap(), "d:18,4,64");
        assert_eq!(c_data_format(&DataType::Decimal128(38, 10)).unwrap(), "d:38,10");
        assert_eq!(
            c_data_format(&DataType::Decimal256(76, 0)).unwrap(),
            "d:76,0,256"
        );
    }

    #[test]
    fn test_nested_and_view_formats() {
        let item = Arc::new(Field::new("item", DataType::Int32, true));
        assert_eq!(c_data_format(&DataType::List(item.clone())).unwrap(), "+l");
        assert_eq!(
            c_data_format(&DataType::LargeList(item.clone())).unwrap(),
            "+L"
        );
        assert_eq!(
            c_data_format(&DataType::ListView(item.clone())).unwrap(),
            "+vl"
        );
        assert_eq!(
            c_data_format(&DataType::FixedSizeList(item, 3)).unwrap(),
            "+w:3"
        );
        assert_eq!(c_data_format(&DataType::Utf8View).unwrap(), "vu");
        assert_eq!(c_data_format(&DataType::BinaryView).unwrap(), "vz");
        assert_eq!(c_data_format(&DataType::FixedSizeBinary(16)).unwrap(), "w:16");
    }

    #[test]
    fn test_dictionary_uses_key_format() {
        let dict = DataType::Dictionary(Box::new(DataType::Int16), Box::new(DataType::Utf8));
        assert_eq!(c_data_format(&dict).unwrap(), "s");
    }

    #[test]
    fn test_fixed_byte_widths() {
        assert_eq!(fixed_byte_width(&DataType::Int8), Some(1));
        assert_eq!(fixed_byte_width(&DataType::Float16), Some(2));
        assert_eq!(fixed_byte_width(&DataType::Int32), Some(4));
        assert_eq!(fixed_byte_width(&DataType::Date32), Some(4));
        assert_eq!(
            fixed_byte_width(&DataType::Timestamp(TimeUnit::Nanosecond, None)),
            Some(8)
        );
        assert_eq!(fixed_byte_width(&DataType::Decimal128(38, 10)), Some(16));
        assert_eq!(fixed_byte_width(&DataType::Decimal256(76, 0)), Some(32));
        assert_eq!(fixed_byte_width(&DataType::FixedSizeBinary(7)), Some(7));
    }

    #[test]
    fn test_no_fixed_width() {
        assert_eq!(fixed_byte_width(&DataType::Boolean), None);
        assert_eq!(fixed_byte_width(&DataType::Utf8), None);
        assert_eq!(fixed_byte_width(&DataType::Binary), None);
        let item = Arc::new(Field::new("item", DataType::Int32, true));
        assert_eq!(fixed_byte_width(&DataType::List(item)), None);
    }
}
