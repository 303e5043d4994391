// Synthetic volumes shared by the integration tests
#![allow(dead_code)]

use relic_core::test_utils::ImageBuilder;
use relic_filesystems::checksum::{carry_around_checksum, crc32c_sector, negated_block_sum};
use relic_filesystems::decoder::Endian;
use std::sync::Once;

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

pub const AMIGA_ROOT: usize = 880 * 512;

/// Rewrite both AmigaDOS checksums after the blocks were edited
pub fn seal_amiga(builder: &mut ImageBuilder) {
    let boot = carry_around_checksum(&builder.data()[..1024], 4);
    builder.data_mut()[4..8].copy_from_slice(&boot.to_be_bytes());
    let root = negated_block_sum(&builder.data()[AMIGA_ROOT..AMIGA_ROOT + 512], 0x14);
    builder.data_mut()[AMIGA_ROOT + 0x14..AMIGA_ROOT + 0x18].copy_from_slice(&root.to_be_bytes());
}

/// 880 KiB FFS floppy named "Workbench"
pub fn amiga_floppy() -> ImageBuilder {
    let mut builder = ImageBuilder::new(1760, 512)
        .bytes(0, b"DOS\x01")
        .u32_be(0x08, 880)
        .bytes(0x0C, &[0x43, 0xFA, 0x00, 0x18])
        .u32_be(AMIGA_ROOT, 2)
        .u32_be(AMIGA_ROOT + 0x0C, 72)
        .u32_be(AMIGA_ROOT + 312, 0xFFFF_FFFF)
        .pascal(AMIGA_ROOT + 432, "Workbench")
        .u32_be(AMIGA_ROOT + 472, 5000)
        .u32_be(AMIGA_ROOT + 484, 4000)
        .u32_be(AMIGA_ROOT + 508, 1);
    seal_amiga(&mut builder);
    builder
}

/// 4 MiB HFS volume named "Macintosh HD", MDB at `base + 0x400`
pub fn hfs_volume(base: usize) -> ImageBuilder {
    let mdb = base + 0x400;
    ImageBuilder::new(8192, 512)
        .u16_be(mdb, 0x4244)
        .u32_be(mdb + 0x02, 3_029_529_600)
        .u32_be(mdb + 0x06, 3_100_000_000)
        .u16_be(mdb + 0x0A, 0x0100)
        .u16_be(mdb + 0x12, 1000)
        .u32_be(mdb + 0x14, 4096)
        .u16_be(mdb + 0x1C, 16)
        .u16_be(mdb + 0x22, 250)
        .pascal(mdb + 0x24, "Macintosh HD")
        .u32_be(mdb + 0x54, 42)
}

/// HFS wrapper around an embedded HFS+ volume
pub fn hfs_wrapper() -> ImageBuilder {
    let header = 16 * 512 + 4 * 4096 + 0x400;
    hfs_volume(0)
        .u16_be(0x47C, 0x482B)
        .u16_be(0x47E, 4)
        .u16_be(0x480, 900)
        .u16_be(header, 0x482B)
        .u16_be(header + 0x02, 4)
        .u32_be(header + 0x04, 0x0100)
        .u32_be(header + 0x28, 4096)
        .u32_be(header + 0x2C, 900)
        .u32_be(header + 0x30, 100)
}

/// 8 MiB bare HFS+ volume
pub fn hfs_plus_volume() -> ImageBuilder {
    ImageBuilder::new(16384, 512)
        .u16_be(0x400, 0x482B)
        .u16_be(0x402, 4)
        .u32_be(0x404, 0x0100)
        .u32_be(0x420, 1234)
        .u32_be(0x428, 4096)
        .u32_be(0x42C, 2048)
        .u32_be(0x430, 1000)
}

/// 2 MiB BeFS volume named "Haiku", superblock at 0x200
pub fn befs_volume(endian: Endian) -> ImageBuilder {
    let put32 = |b: ImageBuilder, at: usize, v: u32| match endian {
        Endian::Big => b.u32_be(0x200 + at, v),
        Endian::Little => b.u32_le(0x200 + at, v),
    };
    let put64 = |b: ImageBuilder, at: usize, v: u64| match endian {
        Endian::Big => b.u64_be(0x200 + at, v),
        Endian::Little => b.u64_le(0x200 + at, v),
    };

    let mut b = ImageBuilder::new(4096, 512).bytes(0x200, b"Haiku\0");
    b = put32(b, 0x20, 0x4246_5331);
    b = put32(b, 0x24, 0x4249_4745);
    b = put32(b, 0x28, 2048);
    b = put32(b, 0x2C, 11);
    b = put64(b, 0x30, 1024);
    b = put64(b, 0x38, 100);
    b = put32(b, 0x44, 0xDD12_1031);
    b = put32(b, 0x54, 0x434C_454E);
    put32(b, 0x70, 0x15B6_830E)
}

/// 1440 KiB Minix v1 volume
pub fn minix_volume(endian: Endian) -> ImageBuilder {
    let put16 = |b: ImageBuilder, at: usize, v: u16| match endian {
        Endian::Big => b.u16_be(0x400 + at, v),
        Endian::Little => b.u16_le(0x400 + at, v),
    };
    let mut b = ImageBuilder::new(2880, 512);
    b = put16(b, 0x00, 480);
    b = put16(b, 0x02, 1440);
    b = put16(b, 0x04, 1);
    b = put16(b, 0x06, 1);
    b = put16(b, 0x08, 20);
    b = put16(b, 0x10, 0x138F);
    put16(b, 0x12, 0x0001)
}

/// 16 MiB XFS v5 volume named "scratch" with a valid superblock CRC
pub fn xfs_volume(sectlog: u8) -> ImageBuilder {
    let mut builder = ImageBuilder::new(32768, 512)
        .bytes(0x00, b"XFSB")
        .u32_be(0x04, 4096)
        .u64_be(0x08, 4096)
        .bytes(0x20, &[0x11; 16])
        .u32_be(0x54, 1024)
        .u32_be(0x58, 4)
        .u16_be(0x64, 0xB4A5)
        .u16_be(0x66, 1u16.checked_shl(sectlog as u32).unwrap_or(0))
        .bytes(0x6C, b"scratch")
        .bytes(0x78, &[12, sectlog])
        .u64_be(0x80, 64)
        .u64_be(0x90, 4000);
    reseal_xfs(&mut builder);
    builder
}

pub fn reseal_xfs(builder: &mut ImageBuilder) {
    let crc = crc32c_sector(&builder.data()[..512], 0xE0);
    builder.data_mut()[0xE0..0xE4].copy_from_slice(&crc.to_le_bytes());
}

/// Every valid fixture with the format it should be identified as
pub fn all_volumes() -> Vec<(&'static str, ImageBuilder)> {
    vec![
        ("amiga-dos", amiga_floppy()),
        ("hfs", hfs_volume(0)),
        ("hfs+", hfs_wrapper()),
        ("hfs+", hfs_plus_volume()),
        ("befs", befs_volume(Endian::Little)),
        ("befs", befs_volume(Endian::Big)),
        ("minix", minix_volume(Endian::Little)),
        ("minix", minix_volume(Endian::Big)),
        ("xfs", xfs_volume(9)),
    ]
}
