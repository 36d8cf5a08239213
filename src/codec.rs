//! Frame validation, decoding and command encoding.
//!
//! Inbound frames are 10 bytes long:
//!
//! ```text
//! AA <type> <d0 d1 d2 d3 d4 d5> <checksum> AB
//! ```
//!
//! where the checksum is the wrapping sum of `d0..=d5`. Command frames are 19
//! bytes long:
//!
//! ```text
//! AA B4 <setting> <write> <11 data bytes> <id1> <id2> <checksum> AB
//! ```
//!
//! where the checksum is the wrapping sum of offsets 2 to 16.

use log::{debug, warn};

use crate::{
    DeviceID, Error, FirmwareVersion, Measurement, OnUnknownSetting, ReportingMode,
    COMMAND_DATA_LEN, COMMAND_ID, DATA_REPORT_ID, HEAD, INBOUND_FRAME_LEN, OUTBOUND_FRAME_LEN,
    REPLY_ID, SETTING_FIRMWARE, SETTING_REPORTING_MODE, SETTING_SLEEP, SETTING_WORKING_PERIOD,
    TAIL,
};

/// A single sensor attribute carried by a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldUpdate {
    Particulates(Measurement),
    ReportingMode(ReportingMode),
    Sleeping(bool),
    Firmware(FirmwareVersion),
    WorkingPeriod(u8),
}

/// Wrapping byte sum used by both frame directions.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// Checks length, header, tail and checksum of an inbound frame.
pub fn check_inbound(frame: &[u8]) -> Result<&[u8; INBOUND_FRAME_LEN], Error> {
    let frame: &[u8; INBOUND_FRAME_LEN] =
        frame.try_into().map_err(|_| Error::MalformedFrame)?;

    if frame[0] != HEAD || frame[9] != TAIL {
        return Err(Error::MalformedFrame);
    }
    if checksum(&frame[2..8]) != frame[8] {
        return Err(Error::ChecksumMismatch);
    }
    Ok(frame)
}

/// Returns `true` if `frame` is a well-formed inbound frame. Never panics.
pub fn validate_inbound(frame: &[u8]) -> bool {
    check_inbound(frame).is_ok()
}

/// Decodes the payload of an inbound frame without validating it.
pub fn decode_frame(frame: &[u8; INBOUND_FRAME_LEN]) -> Result<FieldUpdate, Error> {
    match frame[1] {
        DATA_REPORT_ID => {
            // AA C0 PM25_L PM25_H PM10_L PM10_H ID1 ID2 CS AB
            let pm2_5 = (u16::from(frame[2]) | (u16::from(frame[3]) << 8)) as f32 / 10.0;
            let pm10 = (u16::from(frame[4]) | (u16::from(frame[5]) << 8)) as f32 / 10.0;
            Ok(FieldUpdate::Particulates(Measurement { pm2_5, pm10 }))
        }
        REPLY_ID => decode_reply(frame),
        other => Err(Error::UnknownFrameType(other)),
    }
}

// AA C5 <setting> <write> <value> ... CS AB, firmware replies carry Y M D at 3..=5.
fn decode_reply(frame: &[u8; INBOUND_FRAME_LEN]) -> Result<FieldUpdate, Error> {
    match frame[2] {
        SETTING_REPORTING_MODE => Ok(FieldUpdate::ReportingMode(ReportingMode::from_byte(
            frame[4],
        ))),
        SETTING_SLEEP => Ok(FieldUpdate::Sleeping(frame[4] == 0x00)),
        SETTING_FIRMWARE => Ok(FieldUpdate::Firmware(FirmwareVersion {
            year: frame[3],
            month: frame[4],
            day: frame[5],
        })),
        SETTING_WORKING_PERIOD => Ok(FieldUpdate::WorkingPeriod(frame[4])),
        other => Err(Error::UnknownSetting(other)),
    }
}

/// Stateless codec bound to one sensor address and one unknown-code policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketCodec {
    id: DeviceID,
    on_unknown: OnUnknownSetting,
}

impl PacketCodec {
    pub fn new(id: DeviceID, on_unknown: OnUnknownSetting) -> Self {
        Self { id, on_unknown }
    }

    /// Validates and decodes an inbound frame.
    ///
    /// Returns `Ok(None)` for frames with an unknown type or setting id when
    /// the policy is [`OnUnknownSetting::Ignore`].
    pub fn decode(&self, frame: &[u8]) -> Result<Option<FieldUpdate>, Error> {
        let frame = check_inbound(frame)?;

        match decode_frame(frame) {
            Ok(update) => {
                debug!("Decoded {:?} from {:02X?}", update, frame);
                Ok(Some(update))
            }
            Err(e @ (Error::UnknownSetting(_) | Error::UnknownFrameType(_))) => {
                match self.on_unknown {
                    OnUnknownSetting::Propagate => Err(e),
                    OnUnknownSetting::Ignore => {
                        warn!("Ignoring frame {:02X?}: {}", frame, e);
                        Ok(None)
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Builds a command frame for `setting_id`.
    ///
    /// `data` fills the data bytes starting at offset 4; the rest is zero
    /// padded.
    pub fn encode_command(
        &self,
        setting_id: u8,
        write: bool,
        data: &[u8],
    ) -> Result<[u8; OUTBOUND_FRAME_LEN], Error> {
        if data.len() > COMMAND_DATA_LEN {
            return Err(Error::InvalidArgument);
        }

        let mut command = [0u8; OUTBOUND_FRAME_LEN];
        command[0] = HEAD;
        command[1] = COMMAND_ID;
        command[2] = setting_id;
        command[3] = u8::from(write);
        command[4..4 + data.len()].copy_from_slice(data);
        command[15] = self.id.id1;
        command[16] = self.id.id2;
        command[17] = checksum(&command[2..=16]);
        command[18] = TAIL;
        Ok(command)
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new(DeviceID::default(), OnUnknownSetting::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PM_FRAME: [u8; 10] = [0xAA, 0xC0, 0x4B, 0x00, 0x51, 0x00, 0xE9, 0x77, 0xFC, 0xAB];

    fn reply(setting: u8, d1: u8, d2: u8, d3: u8) -> [u8; 10] {
        let mut frame = [0xAA, 0xC5, setting, d1, d2, d3, 0xFF, 0xFF, 0x00, 0xAB];
        frame[8] = checksum(&frame[2..8]);
        frame
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(!validate_inbound(&[]));
        assert!(!validate_inbound(&PM_FRAME[..9]));
        assert_eq!(check_inbound(&[0xAA; 11]), Err(Error::MalformedFrame));
    }

    #[test]
    fn rejects_bad_header_and_tail() {
        let frame = [0x00, 0xC0, 0x4B, 0x00, 0x51, 0x00, 0xE9, 0x77, 0xFC, 0x00];
        assert!(!validate_inbound(&frame));
        assert_eq!(check_inbound(&frame), Err(Error::MalformedFrame));
    }

    #[test]
    fn rejects_bad_checksum() {
        let frame = [0xAA, 0xC0, 0x4B, 0x00, 0x50, 0x00, 0xE9, 0x77, 0xFC, 0xAB];
        assert_eq!(check_inbound(&frame), Err(Error::ChecksumMismatch));
    }

    #[test]
    fn accepts_valid_frame() {
        assert!(validate_inbound(&PM_FRAME));
    }

    #[test]
    fn decodes_particulates() {
        let update = decode_frame(&PM_FRAME).unwrap();
        assert_eq!(
            update,
            FieldUpdate::Particulates(Measurement {
                pm2_5: 7.5,
                pm10: 8.1
            })
        );
    }

    #[test]
    fn decodes_high_bytes() {
        let mut frame = [0xAA, 0xC0, 0x10, 0x02, 0x00, 0x01, 0x00, 0x00, 0x00, 0xAB];
        frame[8] = checksum(&frame[2..8]);
        // 0x0210 = 528, 0x0100 = 256
        assert_eq!(
            decode_frame(&frame).unwrap(),
            FieldUpdate::Particulates(Measurement {
                pm2_5: 52.8,
                pm10: 25.6
            })
        );
    }

    #[test]
    fn decodes_reporting_mode() {
        assert_eq!(
            decode_frame(&reply(2, 0, 0, 0)).unwrap(),
            FieldUpdate::ReportingMode(ReportingMode::Active)
        );
        assert_eq!(
            decode_frame(&reply(2, 0, 1, 0)).unwrap(),
            FieldUpdate::ReportingMode(ReportingMode::Query)
        );
    }

    #[test]
    fn decodes_sleep() {
        assert_eq!(
            decode_frame(&reply(6, 0, 0, 0)).unwrap(),
            FieldUpdate::Sleeping(true)
        );
        assert_eq!(
            decode_frame(&reply(6, 0, 1, 0)).unwrap(),
            FieldUpdate::Sleeping(false)
        );
    }

    #[test]
    fn decodes_firmware() {
        let frame = [0xAA, 0xC5, 0x07, 0x10, 0x0B, 0x15, 0xE9, 0x77, 0x97, 0xAB];
        assert!(validate_inbound(&frame));
        match decode_frame(&frame).unwrap() {
            FieldUpdate::Firmware(version) => assert_eq!(version.to_string(), "16-11-21"),
            other => panic!("unexpected update {:?}", other),
        }
    }

    #[test]
    fn decodes_working_period() {
        assert_eq!(
            decode_frame(&reply(8, 1, 0x1E, 0)).unwrap(),
            FieldUpdate::WorkingPeriod(30)
        );
    }

    #[test]
    fn unknown_codes_are_errors() {
        assert_eq!(
            decode_frame(&reply(0x09, 0, 0, 0)),
            Err(Error::UnknownSetting(0x09))
        );
        let mut frame = PM_FRAME;
        frame[1] = 0xC1;
        assert_eq!(decode_frame(&frame), Err(Error::UnknownFrameType(0xC1)));
    }

    #[test]
    fn policy_decides_unknown_setting_outcome() {
        let frame = reply(0x05, 0, 0, 0);
        let strict = PacketCodec::new(DeviceID::default(), OnUnknownSetting::Propagate);
        let lenient = PacketCodec::new(DeviceID::default(), OnUnknownSetting::Ignore);

        assert_eq!(strict.decode(&frame), Err(Error::UnknownSetting(0x05)));
        assert_eq!(lenient.decode(&frame), Ok(None));
    }

    #[test]
    fn decode_discards_corrupt_frames_regardless_of_policy() {
        let lenient = PacketCodec::default();
        let mut frame = PM_FRAME;
        frame[8] = 0x00;
        assert_eq!(lenient.decode(&frame), Err(Error::ChecksumMismatch));
    }

    #[test]
    fn encodes_set_working_period() {
        let codec = PacketCodec::default();
        let command = codec.encode_command(0x08, true, &[0x00]).unwrap();
        assert_eq!(
            command,
            [
                0xAA, 0xB4, 0x08, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
                0x00, 0x00, 0xFF, 0xFF, 0x07, 0xAB
            ]
        );
    }

    #[test]
    fn encoded_checksum_covers_data_window() {
        let codec = PacketCodec::new(DeviceID { id1: 0xA1, id2: 0x60 }, OnUnknownSetting::Ignore);
        let command = codec.encode_command(0x02, true, &[0x01, 0x02, 0x03]).unwrap();
        assert_eq!(command[17], checksum(&command[2..=16]));
        assert_eq!(&command[15..17], &[0xA1, 0x60]);
        assert_eq!(command[18], TAIL);
    }

    #[test]
    fn rejects_oversized_data() {
        let codec = PacketCodec::default();
        assert_eq!(
            codec.encode_command(0x02, true, &[0u8; 12]),
            Err(Error::InvalidArgument)
        );
    }
}
