use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)))]
pub enum VolumeError {
    #[snafu(display("Failed to read sector {sector}"))]
    ReadError { sector: u64, source: std::io::Error },
    #[snafu(display("Sector {sector} lies beyond any addressable image"))]
    SectorOutOfRange { sector: u64 },
    #[snafu(display("Unrecognized volume descriptor tag {tag:?} at sector {sector}"))]
    UnknownTag { sector: u64, tag: String },
    #[snafu(display("Volume descriptor at sector {sector} is not a primary ISO9660 descriptor"))]
    NotPrimary { sector: u64 },
    #[snafu(display("No volume descriptor set terminator within {limit} sectors"))]
    UnterminatedDescriptorSet { limit: u64 },
    #[snafu(display("Malformed directory record at sector {sector}, offset {offset}"))]
    MalformedRecord { sector: u64, offset: usize },
    #[snafu(display("Directory at sector {sector} is reachable twice"))]
    DirectoryLoop { sector: u64 },
}
