//! Binary wire protocol shared by the control server and its peer.
//!
//! Control port (peer → device):
//!   `[command:1][param1:1][param2:1]`, answered by a single status byte.
//!
//! Push port (device → peer):
//!   `[file_type:1][length:4 big-endian][payload:length]`.

use thiserror::Error;

/// Size of a command frame on the wire.
pub const FRAME_LEN: usize = 3;

/// Size of the file-push header on the wire.
pub const PUSH_HEADER_LEN: usize = 5;

// ── command codes ────────────────────────────────────────────────────────

pub const CMD_LIGHT: u8 = 0x01;
pub const CMD_PHOTO: u8 = 0x02;
pub const CMD_VIDEO: u8 = 0x03;
pub const CMD_AUDIO_REC: u8 = 0x04;
pub const CMD_AUDIO_PLAY: u8 = 0x05;
pub const CMD_AUDIO_STOP: u8 = 0x06;
pub const CMD_HDMI: u8 = 0x07;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The peer closed the connection before a whole frame arrived.
    #[error("short frame: got {0} of 3 bytes")]
    ShortFrame(usize),
    #[error("unknown command 0x{0:02X}")]
    UnknownCommand(u8),
}

/// A raw 3-byte command frame, as read off the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    pub command: u8,
    pub param1: u8,
    pub param2: u8,
}

impl CommandFrame {
    pub fn new(command: u8, param1: u8, param2: u8) -> Self {
        Self {
            command,
            param1,
            param2,
        }
    }

    pub fn from_bytes(bytes: [u8; FRAME_LEN]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2])
    }

    pub fn to_bytes(self) -> [u8; FRAME_LEN] {
        [self.command, self.param1, self.param2]
    }
}

/// A decoded command.
///
/// Durations are `None` when the peer sent 0, meaning "use the configured
/// default".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Light { on: bool },
    Photo,
    Video { with_audio: bool, duration_secs: Option<u8> },
    AudioRecord { duration_secs: Option<u8> },
    AudioPlay,
    AudioStop,
    /// `port` is 1-based; the wire carries a zero-based index.
    Hdmi { port: u16, on: bool },
}

fn bit0(b: u8) -> bool {
    b & 0x01 == 0x01
}

fn duration(b: u8) -> Option<u8> {
    (b != 0).then_some(b)
}

impl Command {
    pub fn decode(frame: CommandFrame) -> Result<Self, ProtocolError> {
        let CommandFrame {
            command,
            param1,
            param2,
        } = frame;
        let cmd = match command {
            CMD_LIGHT => Self::Light { on: bit0(param1) },
            CMD_PHOTO => Self::Photo,
            CMD_VIDEO => Self::Video {
                with_audio: bit0(param1),
                duration_secs: duration(param2),
            },
            CMD_AUDIO_REC => Self::AudioRecord {
                duration_secs: duration(param2),
            },
            CMD_AUDIO_PLAY => Self::AudioPlay,
            CMD_AUDIO_STOP => Self::AudioStop,
            CMD_HDMI => Self::Hdmi {
                port: u16::from(param1) + 1,
                on: bit0(param2),
            },
            other => return Err(ProtocolError::UnknownCommand(other)),
        };
        Ok(cmd)
    }

    /// Status reported when this command fails.  LIGHT has no failure code.
    pub fn failure_status(&self) -> Status {
        match self {
            Self::Light { .. } => Status::Ok,
            Self::Photo => Status::PhotoFailed,
            Self::Video { .. } => Status::VideoFailed,
            Self::AudioRecord { .. } => Status::AudioRecordFailed,
            Self::AudioPlay => Status::AudioPlayFailed,
            Self::AudioStop => Status::AudioStopFailed,
            Self::Hdmi { .. } => Status::HdmiFailed,
        }
    }

    /// Short name for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Light { .. } => "LIGHT",
            Self::Photo => "PHOTO",
            Self::Video { .. } => "VIDEO",
            Self::AudioRecord { .. } => "AUDIO_REC",
            Self::AudioPlay => "AUDIO_PLAY",
            Self::AudioStop => "AUDIO_STOP",
            Self::Hdmi { .. } => "HDMI",
        }
    }
}

/// One-byte response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    PhotoFailed = 0xF1,
    VideoFailed = 0xF2,
    AudioRecordFailed = 0xF3,
    AudioPlayFailed = 0xF4,
    AudioStopFailed = 0xF5,
    HdmiFailed = 0xF6,
    UnknownCommand = 0xFE,
}

impl Status {
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

// ── file push ────────────────────────────────────────────────────────────

/// Kind of media produced by a capture command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Photo,
    Video,
    Audio,
}

impl MediaKind {
    pub const ALL: [MediaKind; 3] = [MediaKind::Photo, MediaKind::Video, MediaKind::Audio];

    /// Storage subdirectory name.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Photo => "jpg",
            Self::Video => "mp4",
            Self::Audio => "wav",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// `file_type` byte of the push header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileType {
    Unknown = 0x00,
    Photo = 0x01,
    Video = 0x02,
    Audio = 0x03,
}

impl FileType {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x01 => Self::Photo,
            0x02 => Self::Video,
            0x03 => Self::Audio,
            _ => Self::Unknown,
        }
    }
}

impl From<MediaKind> for FileType {
    fn from(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Photo => Self::Photo,
            MediaKind::Video => Self::Video,
            MediaKind::Audio => Self::Audio,
        }
    }
}

/// Header written before every pushed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushHeader {
    pub file_type: FileType,
    pub length: u32,
}

impl PushHeader {
    pub fn encode(&self) -> [u8; PUSH_HEADER_LEN] {
        let mut out = [0u8; PUSH_HEADER_LEN];
        out[0] = self.file_type as u8;
        out[1..].copy_from_slice(&self.length.to_be_bytes());
        out
    }

    pub fn decode(bytes: [u8; PUSH_HEADER_LEN]) -> Self {
        Self {
            file_type: FileType::from_byte(bytes[0]),
            length: u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: [u8; 3]) -> Result<Command, ProtocolError> {
        Command::decode(CommandFrame::from_bytes(bytes))
    }

    #[test]
    fn test_light_uses_bit0() {
        assert_eq!(decode([0x01, 0x01, 0x00]), Ok(Command::Light { on: true }));
        assert_eq!(decode([0x01, 0x02, 0x00]), Ok(Command::Light { on: false }));
        assert_eq!(decode([0x01, 0xFF, 0x00]), Ok(Command::Light { on: true }));
    }

    #[test]
    fn test_video_zero_duration_means_default() {
        assert_eq!(
            decode([0x03, 0x00, 0x00]),
            Ok(Command::Video {
                with_audio: false,
                duration_secs: None
            })
        );
        assert_eq!(
            decode([0x03, 0x01, 0x1E]),
            Ok(Command::Video {
                with_audio: true,
                duration_secs: Some(30)
            })
        );
    }

    #[test]
    fn test_hdmi_port_is_one_based() {
        assert_eq!(
            decode([0x07, 0x00, 0x01]),
            Ok(Command::Hdmi { port: 1, on: true })
        );
        assert_eq!(
            decode([0x07, 0xFF, 0x00]),
            Ok(Command::Hdmi { port: 256, on: false })
        );
    }

    #[test]
    fn test_unknown_commands() {
        for code in [0x00u8, 0x08, 0x7F, 0xFE, 0xFF] {
            assert_eq!(decode([code, 0, 0]), Err(ProtocolError::UnknownCommand(code)));
        }
    }

    #[test]
    fn test_failure_status_bytes() {
        let cases = [
            ([0x02, 0, 0], 0xF1),
            ([0x03, 0, 0], 0xF2),
            ([0x04, 0, 0], 0xF3),
            ([0x05, 0, 0], 0xF4),
            ([0x06, 0, 0], 0xF5),
            ([0x07, 0, 0], 0xF6),
        ];
        for (frame, expected) in cases {
            let cmd = decode(frame).unwrap();
            assert_eq!(cmd.failure_status().as_byte(), expected, "{}", cmd.name());
        }
        assert_eq!(Status::UnknownCommand.as_byte(), 0xFE);
    }

    #[test]
    fn test_push_header_layout() {
        let header = PushHeader {
            file_type: MediaKind::Video.into(),
            length: 0x0102_0304,
        };
        assert_eq!(header.encode(), [0x02, 0x01, 0x02, 0x03, 0x04]);
        assert_eq!(PushHeader::decode(header.encode()), header);
    }

    #[test]
    fn test_unknown_file_type_byte() {
        assert_eq!(FileType::from_byte(0x09), FileType::Unknown);
    }
}
