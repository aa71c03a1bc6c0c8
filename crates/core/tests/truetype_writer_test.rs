//! TrueType data writer and two-pass table directory.

use lode_core::font::writer::{
    TableDirectoryWriter, TrueTypeDataWriter, read_table_directory, table_checksum,
};

#[test]
fn test_write_fixed32_one() {
    let mut w = TrueTypeDataWriter::new();
    w.write_fixed32(1.0).unwrap();
    assert_eq!(w.into_bytes(), vec![0, 1, 0, 0]);
}

#[test]
fn test_write_fixed32_fractions() {
    let mut w = TrueTypeDataWriter::new();
    w.write_fixed32(0.25).unwrap();
    w.write_fixed32(-0.5).unwrap();
    w.write_fixed32(2.0).unwrap();
    assert_eq!(
        w.into_bytes(),
        vec![0x00, 0x00, 0x40, 0x00, 0xFF, 0xFF, 0x80, 0x00, 0x00, 0x02, 0x00, 0x00]
    );
}

#[test]
fn test_integer_writers_are_big_endian() {
    let mut w = TrueTypeDataWriter::new();
    w.write_u16(0x0102).unwrap();
    w.write_i16(-2).unwrap();
    w.write_u32(0x0A0B_0C0D).unwrap();
    w.write_long_datetime(1).unwrap();
    assert_eq!(w.position(), 16);
    assert_eq!(
        w.into_bytes(),
        vec![1, 2, 0xFF, 0xFE, 0x0A, 0x0B, 0x0C, 0x0D, 0, 0, 0, 0, 0, 0, 0, 1]
    );
}

#[test]
fn test_patch_outside_buffer_fails() {
    let mut w = TrueTypeDataWriter::new();
    w.write_u16(0).unwrap();
    assert!(w.patch_u32(0, 7).is_err());
    w.write_u16(0).unwrap();
    w.patch_u32(0, 7).unwrap();
    assert_eq!(w.as_bytes(), &[0, 0, 0, 7]);
}

fn head_table() -> Vec<u8> {
    let mut w = TrueTypeDataWriter::new();
    w.write_fixed32(1.0).unwrap(); // version
    w.write_fixed32(1.0).unwrap(); // fontRevision
    w.write_u32(0).unwrap(); // checkSumAdjustment
    w.write_u32(0x5F0F_3CF5).unwrap(); // magicNumber
    w.write_u16(0x000B).unwrap();
    w.write_u16(1000).unwrap(); // unitsPerEm
    w.write_long_datetime(0).unwrap();
    w.write_long_datetime(0).unwrap();
    for _ in 0..4 {
        w.write_i16(0).unwrap();
    }
    w.write_u16(0).unwrap();
    w.write_u16(8).unwrap();
    w.write_i16(2).unwrap();
    w.write_i16(0).unwrap();
    w.write_i16(0).unwrap();
    w.into_bytes()
}

#[test]
fn test_directory_records_point_at_tables() {
    let mut writer = TableDirectoryWriter::new(TableDirectoryWriter::TRUETYPE);
    writer.add_table(*b"name", b"odd".to_vec());
    writer.add_table(*b"cmap", vec![0, 0, 0, 1, 0, 3, 0, 1]);
    writer.add_table(*b"head", head_table());
    let font = writer.finish().unwrap();

    let (version, records) = read_table_directory(&font).unwrap();
    assert_eq!(version, 0x0001_0000);
    let tags: Vec<&[u8; 4]> = records.iter().map(|r| &r.tag).collect();
    assert_eq!(tags, vec![b"cmap", b"head", b"name"]);

    // searchRange, entrySelector, rangeShift for three tables.
    assert_eq!(&font[4..12], &[0, 3, 0, 32, 0, 1, 0, 16]);

    for record in &records {
        assert_eq!(record.offset % 4, 0);
        let start = record.offset as usize;
        let body = &font[start..start + record.length as usize];
        if &record.tag != b"head" {
            assert_eq!(record.checksum, table_checksum(body));
        }
    }
    let name = records.iter().find(|r| &r.tag == b"name").unwrap();
    assert_eq!(name.length, 3);
    assert_eq!(font.len() % 4, 0);
}

#[test]
fn test_head_checksum_adjustment_balances_file() {
    let mut writer = TableDirectoryWriter::new(TableDirectoryWriter::TRUETYPE);
    writer.add_table(*b"head", head_table());
    writer.add_table(*b"maxp", vec![0, 0, 0x50, 0, 0, 1]);
    let font = writer.finish().unwrap();
    assert_eq!(table_checksum(&font), 0xB1B0_AFBA);
}

#[test]
fn test_replacing_a_table_keeps_one_record() {
    let mut writer = TableDirectoryWriter::new(TableDirectoryWriter::TRUETYPE);
    writer.add_table(*b"post", vec![1; 8]);
    writer.add_table(*b"post", vec![2; 4]);
    let font = writer.finish().unwrap();
    let (_, records) = read_table_directory(&font).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].length, 4);
}

#[test]
fn test_short_head_table_is_rejected() {
    let mut writer = TableDirectoryWriter::new(TableDirectoryWriter::TRUETYPE);
    writer.add_table(*b"head", vec![0; 8]);
    assert!(writer.finish().is_err());
}

fn writer_with_tables(count: u16) -> TableDirectoryWriter {
    let mut writer = TableDirectoryWriter::new(TableDirectoryWriter::TRUETYPE);
    for i in 0..count {
        let [hi, lo] = i.to_be_bytes();
        writer.add_table([b't', b'_', hi, lo], vec![hi, lo]);
    }
    writer
}

#[test]
fn test_directory_table_count_limit() {
    let font = writer_with_tables(4095).finish().unwrap();
    // searchRange 32768, entrySelector 11, rangeShift 32752
    assert_eq!(&font[4..12], &[0x0F, 0xFF, 0x80, 0x00, 0, 11, 0x7F, 0xF0]);
    let (_, records) = read_table_directory(&font).unwrap();
    assert_eq!(records.len(), 4095);

    assert!(writer_with_tables(4096).finish().is_err());
}
