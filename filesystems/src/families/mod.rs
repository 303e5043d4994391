// Filesystem families
// Formats that share structures live together (HFS and HFS+ share the MDB)

pub mod amiga;
pub mod apple;
pub mod befs;
pub mod minix;
pub mod xfs;
