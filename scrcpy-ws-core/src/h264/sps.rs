//! Sequence parameter set parsing.
//!
//! Walks the SPS fields in bitstream order far enough to recover the coded
//! picture size after cropping, plus the sample aspect ratio when VUI is
//! present. No other field is interpreted.

use serde::Serialize;

use crate::error::ScrcpyError;
use crate::h264::bits::{BitReader, to_rbsp};
use crate::h264::nal::NalType;
use crate::h264::CodedDimensions;

/// Profiles whose SPS carries chroma format, bit depth and scaling lists.
pub const HIGH_PROFILES: [u8; 13] = [100, 110, 122, 244, 44, 83, 86, 118, 128, 138, 139, 134, 135];

/// Predefined sample aspect ratios for `aspect_ratio_idc` 1..=16.
const SAR_TABLE: [(u16, u16); 16] = [
    (1, 1),
    (12, 11),
    (10, 11),
    (16, 11),
    (40, 33),
    (24, 11),
    (20, 11),
    (32, 11),
    (80, 33),
    (18, 11),
    (15, 11),
    (64, 33),
    (160, 99),
    (4, 3),
    (3, 2),
    (2, 1),
];

const EXTENDED_SAR: u8 = 255;

// ── SpsInfo ──────────────────────────────────────────────────────

/// The fields recovered from one SPS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpsInfo {
    pub profile_idc: u8,
    pub level_idc: u8,
    /// Display size after cropping.
    pub dimensions: CodedDimensions,
    pub frame_mbs_only: bool,
    /// `(width, height)` of one sample, when signalled in VUI.
    pub sample_aspect_ratio: Option<(u16, u16)>,
}

/// Parse an SPS payload that does **not** include the NAL header byte.
///
/// Emulation-prevention bytes are removed first. Any read past the end of
/// the payload, or a field that cannot be valid, yields
/// [`ScrcpyError::ParseFailed`].
pub fn parse_sps(payload: &[u8]) -> Result<SpsInfo, ScrcpyError> {
    let rbsp = to_rbsp(payload);
    let mut reader = BitReader::new(&rbsp);
    parse_fields(&mut reader).map_err(|e| match e {
        ScrcpyError::OutOfData { .. } => ScrcpyError::ParseFailed("SPS ended before all fields were read"),
        other => other,
    })
}

/// Parse a whole SPS NAL unit, header byte included.
pub fn parse_sps_nal(nal: &[u8]) -> Result<SpsInfo, ScrcpyError> {
    let (&header, payload) = nal
        .split_first()
        .ok_or(ScrcpyError::ParseFailed("empty NAL unit"))?;
    if NalType::from_header(header) != NalType::Sps {
        return Err(ScrcpyError::ParseFailed("NAL unit is not an SPS"));
    }
    parse_sps(payload)
}

fn parse_fields(r: &mut BitReader<'_>) -> Result<SpsInfo, ScrcpyError> {
    let profile_idc = r.read_u8()?;
    let _constraint_flags = r.read_u8()?;
    let level_idc = r.read_u8()?;
    if r.read_ue()? > 31 {
        return Err(ScrcpyError::ParseFailed("seq_parameter_set_id out of range"));
    }

    if HIGH_PROFILES.contains(&profile_idc) {
        let chroma_format_idc = r.read_ue()?;
        if chroma_format_idc > 3 {
            return Err(ScrcpyError::ParseFailed("chroma_format_idc out of range"));
        }
        if chroma_format_idc == 3 {
            let _separate_colour_plane = r.read_flag()?;
        }
        let _bit_depth_luma_minus8 = r.read_ue()?;
        let _bit_depth_chroma_minus8 = r.read_ue()?;
        let _qpprime_y_zero_transform_bypass = r.read_flag()?;
        if r.read_flag()? {
            let lists = if chroma_format_idc == 3 { 12 } else { 8 };
            skip_scaling_lists(r, lists)?;
        }
    }

    let _log2_max_frame_num_minus4 = r.read_ue()?;
    match r.read_ue()? {
        0 => {
            let _log2_max_pic_order_cnt_lsb_minus4 = r.read_ue()?;
        }
        1 => {
            let _delta_pic_order_always_zero = r.read_flag()?;
            let _offset_for_non_ref_pic = r.read_se()?;
            let _offset_for_top_to_bottom_field = r.read_se()?;
            let cycle = r.read_ue()?;
            if cycle > 255 {
                return Err(ScrcpyError::ParseFailed(
                    "num_ref_frames_in_pic_order_cnt_cycle out of range",
                ));
            }
            for _ in 0..cycle {
                let _offset_for_ref_frame = r.read_se()?;
            }
        }
        2 => {}
        _ => return Err(ScrcpyError::ParseFailed("pic_order_cnt_type out of range")),
    }

    let _max_num_ref_frames = r.read_ue()?;
    let _gaps_in_frame_num_allowed = r.read_flag()?;
    let width_in_mbs = u64::from(r.read_ue()?) + 1;
    let height_in_map_units = u64::from(r.read_ue()?) + 1;
    let frame_mbs_only = r.read_flag()?;
    if !frame_mbs_only {
        let _mb_adaptive_frame_field = r.read_flag()?;
    }
    let _direct_8x8_inference = r.read_flag()?;

    let (mut crop_left, mut crop_right, mut crop_top, mut crop_bottom) = (0u64, 0u64, 0u64, 0u64);
    if r.read_flag()? {
        crop_left = u64::from(r.read_ue()?);
        crop_right = u64::from(r.read_ue()?);
        crop_top = u64::from(r.read_ue()?);
        crop_bottom = u64::from(r.read_ue()?);
    }

    // 4:2:0 crop units.
    let field_factor: u64 = if frame_mbs_only { 1 } else { 2 };
    let crop_unit_x = 2;
    let crop_unit_y = 2 * field_factor;

    let coded_width = width_in_mbs * 16;
    let coded_height = height_in_map_units * 16 * field_factor;
    let crop_x = (crop_left + crop_right) * crop_unit_x;
    let crop_y = (crop_top + crop_bottom) * crop_unit_y;
    if crop_x >= coded_width || crop_y >= coded_height {
        return Err(ScrcpyError::ParseFailed("cropping exceeds coded picture"));
    }

    let width = u32::try_from(coded_width - crop_x)
        .map_err(|_| ScrcpyError::ParseFailed("width overflows"))?;
    let height = u32::try_from(coded_height - crop_y)
        .map_err(|_| ScrcpyError::ParseFailed("height overflows"))?;

    // VUI problems never invalidate the dimensions.
    let sample_aspect_ratio = read_vui_sar(r).unwrap_or(None);

    Ok(SpsInfo {
        profile_idc,
        level_idc,
        dimensions: CodedDimensions { width, height },
        frame_mbs_only,
        sample_aspect_ratio,
    })
}

/// Consume `count` optional scaling lists without keeping their values.
fn skip_scaling_lists(r: &mut BitReader<'_>, count: usize) -> Result<(), ScrcpyError> {
    for i in 0..count {
        if !r.read_flag()? {
            continue;
        }
        let size = if i < 6 { 16 } else { 64 };
        let mut last_scale: i32 = 8;
        let mut next_scale: i32 = 8;
        for _ in 0..size {
            if next_scale != 0 {
                let delta = r.read_se()?;
                next_scale = (last_scale + delta + 256).rem_euclid(256);
            }
            if next_scale != 0 {
                last_scale = next_scale;
            }
        }
    }
    Ok(())
}

fn read_vui_sar(r: &mut BitReader<'_>) -> Result<Option<(u16, u16)>, ScrcpyError> {
    if !r.read_flag()? {
        return Ok(None);
    }
    if !r.read_flag()? {
        return Ok(None);
    }
    let idc = r.read_u8()?;
    let sar = match idc {
        EXTENDED_SAR => {
            let w = r.read_bits(16)? as u16;
            let h = r.read_bits(16)? as u16;
            (w != 0 && h != 0).then_some((w, h))
        }
        1..=16 => Some(SAR_TABLE[usize::from(idc) - 1]),
        _ => None,
    };
    Ok(sar)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// MSB-first bit writer used to synthesize SPS payloads.
    #[derive(Default)]
    pub(crate) struct BitWriter {
        bytes: Vec<u8>,
        bits: usize,
    }

    impl BitWriter {
        pub(crate) fn bits(&mut self, value: u32, n: u32) -> &mut Self {
            for i in (0..n).rev() {
                if self.bits % 8 == 0 {
                    self.bytes.push(0);
                }
                let bit = ((value >> i) & 1) as u8;
                let last = self.bytes.len() - 1;
                self.bytes[last] |= bit << (7 - (self.bits % 8));
                self.bits += 1;
            }
            self
        }

        pub(crate) fn flag(&mut self, on: bool) -> &mut Self {
            self.bits(u32::from(on), 1)
        }

        pub(crate) fn ue(&mut self, value: u32) -> &mut Self {
            let coded = u64::from(value) + 1;
            let len = 64 - coded.leading_zeros();
            self.bits(0, len - 1);
            for i in (0..len).rev() {
                self.bits(((coded >> i) & 1) as u32, 1);
            }
            self
        }

        pub(crate) fn se(&mut self, value: i32) -> &mut Self {
            let mapped = if value > 0 {
                (value as u32) * 2 - 1
            } else {
                (-value) as u32 * 2
            };
            self.ue(mapped)
        }

        /// rbsp_trailing_bits plus emulation prevention.
        pub(crate) fn finish(&mut self) -> Vec<u8> {
            self.bits(1, 1);
            while self.bits % 8 != 0 {
                self.bits(0, 1);
            }
            let mut out = Vec::with_capacity(self.bytes.len() + 4);
            let mut zeros = 0;
            for &b in &self.bytes {
                if zeros >= 2 && b <= 0x03 {
                    out.push(0x03);
                    zeros = 0;
                }
                zeros = if b == 0 { zeros + 1 } else { 0 };
                out.push(b);
            }
            out
        }
    }

    #[derive(Clone, Copy)]
    pub(crate) struct SpsFixture {
        pub(crate) profile_idc: u8,
        pub(crate) width_mbs_minus1: u32,
        pub(crate) height_units_minus1: u32,
        pub(crate) frame_mbs_only: bool,
        pub(crate) crop: Option<(u32, u32, u32, u32)>,
        pub(crate) poc_type: u32,
        pub(crate) scaling: bool,
        pub(crate) sar_idc: Option<u8>,
    }

    impl SpsFixture {
        pub(crate) fn baseline(width_mbs_minus1: u32, height_units_minus1: u32) -> Self {
            Self {
                profile_idc: 66,
                width_mbs_minus1,
                height_units_minus1,
                frame_mbs_only: true,
                crop: None,
                poc_type: 2,
                scaling: false,
                sar_idc: None,
            }
        }

        /// SPS payload without the NAL header byte.
        pub(crate) fn payload(&self) -> Vec<u8> {
            let mut w = BitWriter::default();
            w.bits(u32::from(self.profile_idc), 8).bits(0xC0, 8).bits(31, 8).ue(0);
            if HIGH_PROFILES.contains(&self.profile_idc) {
                w.ue(1).ue(0).ue(0).flag(false).flag(self.scaling);
                if self.scaling {
                    // list 0 present with a handful of deltas then an end marker,
                    // list 6 present and flat, everything else absent.
                    for i in 0..8 {
                        let present = i == 0 || i == 6;
                        w.flag(present);
                        if i == 0 {
                            w.se(3).se(-2).se(-9);
                        } else if i == 6 {
                            for _ in 0..64 {
                                w.se(0);
                            }
                        }
                    }
                }
            }
            w.ue(0).ue(self.poc_type);
            match self.poc_type {
                0 => {
                    w.ue(2);
                }
                1 => {
                    w.flag(false).se(-1).se(4).ue(3).se(1).se(-2).se(5);
                }
                _ => {}
            }
            w.ue(1).flag(false).ue(self.width_mbs_minus1).ue(self.height_units_minus1);
            w.flag(self.frame_mbs_only);
            if !self.frame_mbs_only {
                w.flag(true);
            }
            w.flag(true);
            match self.crop {
                Some((l, r, t, b)) => {
                    w.flag(true).ue(l).ue(r).ue(t).ue(b);
                }
                None => {
                    w.flag(false);
                }
            }
            match self.sar_idc {
                Some(idc) => {
                    w.flag(true).flag(true).bits(u32::from(idc), 8);
                    if idc == EXTENDED_SAR {
                        w.bits(4, 16).bits(3, 16);
                    }
                    // rest of VUI cut short on purpose
                }
                None => {
                    w.flag(false);
                }
            }
            w.finish()
        }
    }

    #[test]
    fn baseline_round_trip() {
        let sps = SpsFixture::baseline(39, 29).payload();
        let info = parse_sps(&sps).unwrap();
        assert_eq!(info.profile_idc, 66);
        assert_eq!(info.level_idc, 31);
        assert_eq!(info.dimensions, CodedDimensions { width: 640, height: 480 });
        assert!(info.frame_mbs_only);
        assert_eq!(info.sample_aspect_ratio, None);
    }

    #[test]
    fn cropped_1080p() {
        let mut f = SpsFixture::baseline(119, 67);
        f.crop = Some((0, 0, 0, 4));
        let info = parse_sps(&f.payload()).unwrap();
        assert_eq!(info.dimensions, CodedDimensions { width: 1920, height: 1080 });
    }

    #[test]
    fn cropped_portrait_phone_size() {
        // 34 MBs = 544 wide, cropped right by 2 units of 2 -> 540.
        let mut f = SpsFixture::baseline(33, 59);
        f.crop = Some((0, 2, 0, 0));
        f.poc_type = 0;
        let info = parse_sps(&f.payload()).unwrap();
        assert_eq!(info.dimensions, CodedDimensions { width: 540, height: 960 });
    }

    #[test]
    fn field_coding_doubles_height_and_crop_unit() {
        let mut f = SpsFixture::baseline(44, 17);
        f.frame_mbs_only = false;
        f.crop = Some((1, 1, 0, 2));
        f.poc_type = 1;
        let info = parse_sps(&f.payload()).unwrap();
        // 45*16 - 2*2 = 716; 18*16*2 - 2*4 = 568
        assert_eq!(info.dimensions, CodedDimensions { width: 716, height: 568 });
        assert!(!info.frame_mbs_only);
    }

    #[test]
    fn high_profile_with_scaling_lists() {
        let mut f = SpsFixture::baseline(79, 44);
        f.profile_idc = 100;
        f.scaling = true;
        f.poc_type = 0;
        let info = parse_sps(&f.payload()).unwrap();
        assert_eq!(info.profile_idc, 100);
        assert_eq!(info.dimensions, CodedDimensions { width: 1280, height: 720 });
    }

    #[test]
    fn round_trip_grid() {
        for profile in [66u8, 77, 100, 244] {
            for (w, h) in [(0u32, 0u32), (21, 39), (79, 44), (255, 134)] {
                for frame_mbs_only in [true, false] {
                    let mut f = SpsFixture::baseline(w, h);
                    f.profile_idc = profile;
                    f.frame_mbs_only = frame_mbs_only;
                    let info = parse_sps(&f.payload()).unwrap();
                    let factor = if frame_mbs_only { 1 } else { 2 };
                    assert_eq!(info.dimensions.width, (w + 1) * 16);
                    assert_eq!(info.dimensions.height, (h + 1) * 16 * factor);
                }
            }
        }
    }

    #[test]
    fn sample_aspect_ratio_from_vui() {
        let mut f = SpsFixture::baseline(39, 29);
        f.sar_idc = Some(2);
        assert_eq!(parse_sps(&f.payload()).unwrap().sample_aspect_ratio, Some((12, 11)));

        f.sar_idc = Some(EXTENDED_SAR);
        assert_eq!(parse_sps(&f.payload()).unwrap().sample_aspect_ratio, Some((4, 3)));
    }

    #[test]
    fn truncated_payload_fails() {
        let sps = SpsFixture::baseline(39, 29).payload();
        for cut in 0..5 {
            let err = parse_sps(&sps[..cut]).unwrap_err();
            assert!(matches!(err, ScrcpyError::ParseFailed(_)), "cut {cut}: {err}");
        }
    }

    #[test]
    fn excessive_crop_fails() {
        let mut f = SpsFixture::baseline(0, 0);
        f.crop = Some((4, 4, 0, 0));
        assert!(matches!(
            parse_sps(&f.payload()),
            Err(ScrcpyError::ParseFailed("cropping exceeds coded picture"))
        ));
    }

    #[test]
    fn invalid_poc_type_fails() {
        let mut f = SpsFixture::baseline(10, 10);
        f.poc_type = 3;
        assert!(matches!(
            parse_sps(&f.payload()),
            Err(ScrcpyError::ParseFailed("pic_order_cnt_type out of range"))
        ));
    }

    #[test]
    fn nal_wrapper_checks_type() {
        let mut nal = vec![0x67];
        nal.extend(SpsFixture::baseline(39, 29).payload());
        assert_eq!(
            parse_sps_nal(&nal).unwrap().dimensions,
            CodedDimensions { width: 640, height: 480 }
        );

        nal[0] = 0x68;
        assert!(parse_sps_nal(&nal).is_err());
        assert!(parse_sps_nal(&[]).is_err());
    }
}
