//! Conversions between bit-rate representations.

use std::ops::RangeInclusive;

use crate::error::{BtrError, BtrResult};
use crate::types::*;

// ── Register limits ─────────────────────────────────────────────

const SJA1000_BRP: RangeInclusive<u32> = 1..=64;
const SJA1000_TSEG1: RangeInclusive<u32> = 1..=16;
const SJA1000_TSEG2: RangeInclusive<u32> = 1..=8;
const SJA1000_SJW: RangeInclusive<u32> = 1..=4;
const SAM: RangeInclusive<u32> = 0..=1;

const FD_NOMINAL_BRP: RangeInclusive<u32> = 1..=1024;
const FD_NOMINAL_TSEG1: RangeInclusive<u32> = 1..=256;
const FD_NOMINAL_TSEG2: RangeInclusive<u32> = 1..=128;
const FD_NOMINAL_SJW: RangeInclusive<u32> = 1..=128;
const FD_DATA_BRP: RangeInclusive<u32> = 1..=1024;
const FD_DATA_TSEG1: RangeInclusive<u32> = 1..=32;
const FD_DATA_TSEG2: RangeInclusive<u32> = 1..=16;
const FD_DATA_SJW: RangeInclusive<u32> = 1..=16;

fn check(field: &'static str, value: impl Into<u32>, range: RangeInclusive<u32>) -> BtrResult<()> {
    let value = value.into();
    if range.contains(&value) {
        Ok(())
    } else {
        Err(BtrError::OutOfRange {
            field,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

// ── Index ───────────────────────────────────────────────────────

/// Map a symbolic index code (`0` … `-8`) to its canonical register fields.
pub fn index_to_bitrate(index: i32) -> BtrResult<BitTiming> {
    let index = BitrateIndex::from_code(index)?;
    Ok(sja1000_to_bitrate(index.btr0btr1()))
}

// ── SJA1000 BTR0BTR1 ────────────────────────────────────────────
//
// +---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+
// |  SJW  |          BRP          |SAM|   TSEG2   |     TSEG1     |
// +---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+

/// Pack nominal timing into the 16-bit BTR0BTR1 word.
///
/// BRP, TSEG1, TSEG2 and SJW are stored minus one; SAM as-is. The clock
/// frequency is not checked here.
pub fn bitrate_to_sja1000(timing: &BitTiming) -> BtrResult<u16> {
    let nominal = &timing.nominal;
    check("nom_brp", nominal.brp, SJA1000_BRP)?;
    check("nom_tseg1", nominal.tseg1, SJA1000_TSEG1)?;
    check("nom_tseg2", nominal.tseg2, SJA1000_TSEG2)?;
    check("nom_sjw", nominal.sjw, SJA1000_SJW)?;
    check("nom_sam", nominal.sam, SAM)?;

    Ok((((nominal.sjw - 1) & 0x0003) << 14)
        | (((nominal.brp - 1) & 0x003F) << 8)
        | ((u16::from(nominal.sam) & 0x0001) << 7)
        | (((nominal.tseg2 - 1) & 0x0007) << 4)
        | ((nominal.tseg1 - 1) & 0x000F))
}

/// Unpack a BTR0BTR1 word into register fields at the SJA1000 clock.
pub fn sja1000_to_bitrate(btr0btr1: u16) -> BitTiming {
    BitTiming {
        frequency: SJA1000_CLOCK,
        nominal: NominalTiming {
            sjw: ((btr0btr1 >> 14) & 0x0003) + 1,
            brp: ((btr0btr1 >> 8) & 0x003F) + 1,
            sam: ((btr0btr1 >> 7) & 0x0001) as u8,
            tseg2: ((btr0btr1 >> 4) & 0x0007) + 1,
            tseg1: (btr0btr1 & 0x000F) + 1,
        },
        data: None,
    }
}

// ── CAN FD limits ───────────────────────────────────────────────

/// Check a timing against the CAN FD register ranges.
pub fn validate_fd(timing: &BitTiming) -> BtrResult<()> {
    if timing.frequency == 0 {
        return Err(BtrError::OutOfRange {
            field: "f_clock",
            value: 0,
            min: 1,
            max: u32::MAX,
        });
    }
    let nominal = &timing.nominal;
    check("nom_brp", nominal.brp, FD_NOMINAL_BRP)?;
    check("nom_tseg1", nominal.tseg1, FD_NOMINAL_TSEG1)?;
    check("nom_tseg2", nominal.tseg2, FD_NOMINAL_TSEG2)?;
    check("nom_sjw", nominal.sjw, FD_NOMINAL_SJW)?;
    check("nom_sam", nominal.sam, SAM)?;
    if let Some(data) = &timing.data {
        check("data_brp", data.brp, FD_DATA_BRP)?;
        check("data_tseg1", data.tseg1, FD_DATA_TSEG1)?;
        check("data_tseg2", data.tseg2, FD_DATA_TSEG2)?;
        check("data_sjw", data.sjw, FD_DATA_SJW)?;
    }
    Ok(())
}

// ── key=value strings ───────────────────────────────────────────

#[derive(Default)]
struct Fields {
    f_clock: Option<u32>,
    nom_brp: Option<u16>,
    nom_tseg1: Option<u16>,
    nom_tseg2: Option<u16>,
    nom_sjw: Option<u16>,
    nom_sam: Option<u8>,
    data_brp: Option<u16>,
    data_tseg1: Option<u16>,
    data_tseg2: Option<u16>,
    data_sjw: Option<u16>,
}

fn store<T>(slot: &mut Option<T>, key: &str, value: T) -> BtrResult<()> {
    if slot.replace(value).is_some() {
        return Err(BtrError::Malformed(format!("duplicate key `{key}`")));
    }
    Ok(())
}

fn number<T: std::str::FromStr>(key: &str, value: &str) -> BtrResult<T> {
    value
        .parse()
        .map_err(|_| BtrError::Malformed(format!("`{key}` has non-numeric value `{value}`")))
}

/// Parse a comma-separated `key=value` list, e.g.
/// `f_clock_mhz=80,nom_brp=2,nom_tseg1=63,nom_tseg2=16,nom_sjw=16`.
///
/// Any `data_*` key requests a data phase, which then needs all four data
/// fields. `nom_sam` defaults to 0.
pub fn string_to_bitrate(text: &str) -> BtrResult<BitTiming> {
    let mut fields = Fields::default();

    for pair in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| BtrError::Malformed(format!("expected key=value, got `{pair}`")))?;
        let (key, value) = (key.trim(), value.trim());

        match key {
            "f_clock" => store(&mut fields.f_clock, key, number(key, value)?)?,
            "f_clock_mhz" => {
                let mhz: u32 = number(key, value)?;
                let hz = mhz
                    .checked_mul(1_000_000)
                    .ok_or_else(|| BtrError::Malformed(format!("`{key}` overflows: {mhz}")))?;
                store(&mut fields.f_clock, key, hz)?
            }
            "nom_brp" => store(&mut fields.nom_brp, key, number(key, value)?)?,
            "nom_tseg1" => store(&mut fields.nom_tseg1, key, number(key, value)?)?,
            "nom_tseg2" => store(&mut fields.nom_tseg2, key, number(key, value)?)?,
            "nom_sjw" => store(&mut fields.nom_sjw, key, number(key, value)?)?,
            "nom_sam" => store(&mut fields.nom_sam, key, number(key, value)?)?,
            "data_brp" => store(&mut fields.data_brp, key, number(key, value)?)?,
            "data_tseg1" => store(&mut fields.data_tseg1, key, number(key, value)?)?,
            "data_tseg2" => store(&mut fields.data_tseg2, key, number(key, value)?)?,
            "data_sjw" => store(&mut fields.data_sjw, key, number(key, value)?)?,
            other => return Err(BtrError::UnknownKey(other.to_string())),
        }
    }

    let data = if fields.data_brp.is_some()
        || fields.data_tseg1.is_some()
        || fields.data_tseg2.is_some()
        || fields.data_sjw.is_some()
    {
        Some(DataTiming {
            brp: fields.data_brp.ok_or(BtrError::MissingKey("data_brp"))?,
            tseg1: fields.data_tseg1.ok_or(BtrError::MissingKey("data_tseg1"))?,
            tseg2: fields.data_tseg2.ok_or(BtrError::MissingKey("data_tseg2"))?,
            sjw: fields.data_sjw.ok_or(BtrError::MissingKey("data_sjw"))?,
        })
    } else {
        None
    };

    let timing = BitTiming {
        frequency: fields.f_clock.ok_or(BtrError::MissingKey("f_clock"))?,
        nominal: NominalTiming {
            brp: fields.nom_brp.ok_or(BtrError::MissingKey("nom_brp"))?,
            tseg1: fields.nom_tseg1.ok_or(BtrError::MissingKey("nom_tseg1"))?,
            tseg2: fields.nom_tseg2.ok_or(BtrError::MissingKey("nom_tseg2"))?,
            sjw: fields.nom_sjw.ok_or(BtrError::MissingKey("nom_sjw"))?,
            sam: fields.nom_sam.unwrap_or(0),
        },
        data,
    };
    validate_fd(&timing)?;
    Ok(timing)
}

/// Render a timing as a `key=value` list; the data group is left out when
/// no data phase is configured.
pub fn bitrate_to_string(timing: &BitTiming) -> String {
    let nominal = &timing.nominal;
    let mut text = format!(
        "f_clock={},nom_brp={},nom_tseg1={},nom_tseg2={},nom_sjw={},nom_sam={}",
        timing.frequency, nominal.brp, nominal.tseg1, nominal.tseg2, nominal.sjw, nominal.sam
    );
    if let Some(data) = &timing.data {
        text.push_str(&format!(
            ",data_brp={},data_tseg1={},data_tseg2={},data_sjw={}",
            data.brp, data.tseg1, data.tseg2, data.sjw
        ));
    }
    text
}

// ── Bus speed ───────────────────────────────────────────────────

fn phase_speed(frequency: u32, brp: u16, tseg1: u16, tseg2: u16) -> PhaseSpeed {
    let quanta = 1.0 + f64::from(tseg1) + f64::from(tseg2);
    PhaseSpeed {
        speed: f64::from(frequency) / (f64::from(brp) * quanta),
        samplepoint: (1.0 + f64::from(tseg1)) / quanta,
    }
}

/// Compute bus speed (`f / (brp * (1 + tseg1 + tseg2))`) and sample point
/// (`(1 + tseg1) / (1 + tseg1 + tseg2)`) for each configured phase.
pub fn bitrate_to_speed(timing: &BitTiming) -> BtrResult<BusSpeed> {
    check("f_clock", timing.frequency, 1..=u32::MAX)?;
    check("nom_brp", timing.nominal.brp, 1..=u32::MAX)?;
    if let Some(data) = &timing.data {
        check("data_brp", data.brp, 1..=u32::MAX)?;
    }

    let nominal = &timing.nominal;
    Ok(BusSpeed {
        nominal: phase_speed(timing.frequency, nominal.brp, nominal.tseg1, nominal.tseg2),
        data: timing
            .data
            .map(|data| phase_speed(timing.frequency, data.brp, data.tseg1, data.tseg2)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classic(brp: u16, tseg1: u16, tseg2: u16, sjw: u16, sam: u8) -> BitTiming {
        BitTiming {
            frequency: SJA1000_CLOCK,
            nominal: NominalTiming {
                brp,
                tseg1,
                tseg2,
                sjw,
                sam,
            },
            data: None,
        }
    }

    fn fd_500k_2m() -> BitTiming {
        BitTiming {
            frequency: 80_000_000,
            nominal: NominalTiming {
                brp: 2,
                tseg1: 63,
                tseg2: 16,
                sjw: 16,
                sam: 0,
            },
            data: Some(DataTiming {
                brp: 2,
                tseg1: 15,
                tseg2: 4,
                sjw: 4,
            }),
        }
    }

    #[test]
    fn index_250k_fields() {
        let timing = index_to_bitrate(-3).unwrap();
        assert_eq!(timing.frequency, 8_000_000);
        assert_eq!(timing.nominal, NominalTiming {
            brp: 2,
            tseg1: 13,
            tseg2: 2,
            sjw: 1,
            sam: 0,
        });
        assert!(timing.data.is_none());
    }

    #[test]
    fn index_speeds_match_names() {
        for index in BitrateIndex::ALL {
            let timing = index_to_bitrate(index.code()).unwrap();
            let speed = bitrate_to_speed(&timing).unwrap();
            assert_eq!(speed.nominal.speed, f64::from(index.kbps()) * 1000.0, "{index}");
        }
    }

    #[test]
    fn unknown_index_is_invalid() {
        assert_eq!(index_to_bitrate(-9), Err(BtrError::UnknownIndex(-9)));
        assert_eq!(index_to_bitrate(3), Err(BtrError::UnknownIndex(3)));
    }

    #[test]
    fn index_survives_sja1000_round_trip() {
        for index in BitrateIndex::ALL {
            let timing = index_to_bitrate(index.code()).unwrap();
            let code = bitrate_to_sja1000(&timing).unwrap();
            assert_eq!(code, index.btr0btr1());
            let back = sja1000_to_bitrate(code);
            assert_eq!(
                bitrate_to_speed(&back).unwrap(),
                bitrate_to_speed(&timing).unwrap()
            );
        }
    }

    #[test]
    fn sja1000_bit_layout() {
        // sjw=4 brp=64 sam=1 tseg2=8 tseg1=16 → every field at its maximum
        assert_eq!(bitrate_to_sja1000(&classic(64, 16, 8, 4, 1)).unwrap(), 0xFFFF);
        // all minimums
        assert_eq!(bitrate_to_sja1000(&classic(1, 1, 1, 1, 0)).unwrap(), 0x0000);
        // sam lands in bit 7 unshifted
        assert_eq!(bitrate_to_sja1000(&classic(1, 1, 1, 1, 1)).unwrap(), 0x0080);
        // 100K: BTR0=0x43 BTR1=0x2F
        assert_eq!(bitrate_to_sja1000(&classic(4, 16, 3, 2, 0)).unwrap(), 0x432F);
    }

    #[test]
    fn sja1000_rejects_out_of_range() {
        let err = bitrate_to_sja1000(&classic(0, 13, 2, 1, 0)).unwrap_err();
        assert!(matches!(err, BtrError::OutOfRange { field: "nom_brp", value: 0, .. }));
        assert!(bitrate_to_sja1000(&classic(65, 13, 2, 1, 0)).is_err());
        assert!(bitrate_to_sja1000(&classic(2, 17, 2, 1, 0)).is_err());
        assert!(bitrate_to_sja1000(&classic(2, 13, 9, 1, 0)).is_err());
        assert!(bitrate_to_sja1000(&classic(2, 13, 2, 5, 0)).is_err());
        assert!(bitrate_to_sja1000(&classic(2, 13, 2, 1, 2)).is_err());
    }

    #[test]
    fn string_round_trip_classic() {
        let timing = classic(2, 13, 2, 1, 1);
        let text = bitrate_to_string(&timing);
        assert_eq!(
            text,
            "f_clock=8000000,nom_brp=2,nom_tseg1=13,nom_tseg2=2,nom_sjw=1,nom_sam=1"
        );
        assert_eq!(string_to_bitrate(&text).unwrap(), timing);
    }

    #[test]
    fn string_round_trip_keeps_data_phase() {
        let timing = fd_500k_2m();
        let text = timing.to_string();
        assert!(text.ends_with(",data_brp=2,data_tseg1=15,data_tseg2=4,data_sjw=4"));
        let back: BitTiming = text.parse().unwrap();
        assert_eq!(back, timing);
        assert!(back.has_data_phase());
    }

    #[test]
    fn string_accepts_mhz_and_whitespace() {
        let timing =
            string_to_bitrate(" f_clock_mhz=80, nom_brp=2 ,nom_tseg1=63,nom_tseg2=16,nom_sjw=16")
                .unwrap();
        assert_eq!(timing.frequency, 80_000_000);
        assert_eq!(timing.nominal.sam, 0);
        assert!(timing.data.is_none());
    }

    #[test]
    fn string_rejects_unknown_key() {
        let text = "f_clock=8000000,nom_brp=2,nom_tseg1=13,nom_tseg2=2,nom_sjw=1,foo=1";
        let err = string_to_bitrate(text).unwrap_err();
        assert_eq!(err, BtrError::UnknownKey("foo".into()));
    }

    #[test]
    fn string_rejects_partial_data_group() {
        let err = string_to_bitrate(
            "f_clock=80000000,nom_brp=2,nom_tseg1=63,nom_tseg2=16,nom_sjw=16,data_brp=2",
        )
        .unwrap_err();
        assert_eq!(err, BtrError::MissingKey("data_tseg1"));
    }

    #[test]
    fn string_rejects_missing_clock_and_garbage() {
        assert_eq!(
            string_to_bitrate("nom_brp=2,nom_tseg1=13,nom_tseg2=2,nom_sjw=1"),
            Err(BtrError::MissingKey("f_clock"))
        );
        assert!(matches!(
            string_to_bitrate("f_clock=abc"),
            Err(BtrError::Malformed(_))
        ));
        assert!(matches!(
            string_to_bitrate("f_clock=8000000,f_clock_mhz=8"),
            Err(BtrError::Malformed(_))
        ));
        assert!(matches!(string_to_bitrate("f_clock"), Err(BtrError::Malformed(_))));
    }

    #[test]
    fn string_range_checked() {
        let err = string_to_bitrate(
            "f_clock=80000000,nom_brp=2,nom_tseg1=63,nom_tseg2=16,nom_sjw=16,\
             data_brp=2,data_tseg1=33,data_tseg2=4,data_sjw=4",
        )
        .unwrap_err();
        assert!(matches!(err, BtrError::OutOfRange { field: "data_tseg1", .. }));
    }

    #[test]
    fn speed_and_samplepoint() {
        let speed = bitrate_to_speed(&fd_500k_2m()).unwrap();
        assert_eq!(speed.nominal.speed, 500_000.0);
        assert_eq!(speed.nominal.samplepoint, 0.8);
        let data = speed.data.unwrap();
        assert_eq!(data.speed, 2_000_000.0);
        assert_eq!(data.samplepoint, 0.8);
    }

    #[test]
    fn speed_rejects_zero_prescaler() {
        assert!(bitrate_to_speed(&classic(0, 13, 2, 1, 0)).is_err());
    }
}
