use colored::Colorize;
use discgraft::disc::{DataTrack, Track};
use discgraft::ext::BestEffortPathExt;
use discgraft::iso9660::{VolFile, Volume};
use discgraft::project::{FilterNotice, GraftTarget};
use discgraft::vfs::SECTOR_SIZE;
use supports_color::Stream;

const MIB: u64 = 1024 * 1024;

/// Turns colors off when stdout can't show them.
pub fn setup_colors() {
    if supports_color::on(Stream::Stdout).is_none() {
        colored::control::set_override(false);
    }
}

pub fn print(lines: Vec<String>) {
    for line in lines {
        println!("{line}");
    }
}

fn size(sectors: i64) -> String {
    let bytes = sectors.max(0) as u64 * SECTOR_SIZE;
    format!("{} sectors, {:.1} MiB", sectors, bytes as f64 / MIB as f64)
}

pub fn volume_lines(volume: &Volume) -> Vec<String> {
    let mut lines = vec![format!(
        "{} ({}{})",
        volume.label.bold(),
        size(i64::from(volume.size)),
        if volume.joliet { ", Joliet" } else { "" }
    )];
    for (path, file) in volume.root.walk() {
        lines.push(match file {
            VolFile::Directory { .. } => format!("{}/", path.blue().bold()),
            VolFile::File {
                size_bytes,
                start_sector,
                ..
            } => format!("{path}  {size_bytes} bytes at sector {start_sector}"),
        });
    }
    lines
}

fn data_track_lines(track: &DataTrack) -> Vec<String> {
    let mut lines = vec![format!("{} ({})", track.label.bold(), size(track.sectors))];
    if track.imported_sectors > 0 {
        lines.push(format!("previous sessions: {}", size(track.imported_sectors)));
    }
    for graft in &track.grafts {
        let target = match &graft.target {
            GraftTarget::Filesystem(uri) => uri.best_effort_path_display(),
            GraftTarget::Created => "new folder".to_string(),
            GraftTarget::Imported => "previous session".to_string(),
        };
        lines.push(format!("{} <- {}", graft.path.blue(), target));
    }
    for uri in &track.excluded {
        lines.push(format!("{} {}", "excluded".yellow(), uri.best_effort_path_display()));
    }
    for (path, joliet) in &track.joliet_names {
        lines.push(format!("{} {} as {}", "joliet".cyan(), path, joliet));
    }
    lines
}

pub fn track_lines(track: &Track) -> Vec<String> {
    match track {
        Track::Data(track) => data_track_lines(track),
        Track::Audio(track) => std::iter::once(track.title.bold().to_string())
            .chain(
                track
                    .sources
                    .iter()
                    .enumerate()
                    .map(|(index, uri)| format!("{:>2}. {}", index + 1, uri.best_effort_path_display())),
            )
            .collect(),
    }
}

pub fn notice_lines(notices: &[FilterNotice]) -> Vec<String> {
    notices
        .iter()
        .map(|notice| {
            let verb = if notice.restored {
                "restored".green()
            } else {
                "filtered".yellow()
            };
            format!(
                "{} {} ({})",
                verb,
                notice.uri.best_effort_path_display(),
                notice.status
            )
        })
        .collect()
}
