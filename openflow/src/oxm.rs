// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! OXM match fields, the flow match, and the per-packet field view.
//!
//! The OXM TLVs modeled here are the subset the pipeline matches and rewrites.
//! Values are kept typed rather than as raw byte strings; `wire_size` /
//! `wire_len` report the sizes the on-the-wire encoding would have, which is
//! what the table-miss rule is defined against.

use crate::mac::Mac;
use std::fmt::Display;
use std::net::Ipv4Addr;

/// The OXM fields understood by this datapath.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub enum OxmField {
    /// Ingress port.
    InPort,
    /// Ethernet destination address.
    EthDst,
    /// Ethernet source address.
    EthSrc,
    /// Ethernet frame type.
    EthType,
    /// Pipeline metadata register.
    Metadata,
    /// IP protocol number.
    IpProto,
    /// IPv4 source address.
    Ipv4Src,
    /// IPv4 destination address.
    Ipv4Dst,
    /// TCP source port.
    TcpSrc,
    /// TCP destination port.
    TcpDst,
    /// UDP source port.
    UdpSrc,
    /// UDP destination port.
    UdpDst,
}

impl OxmField {
    /// Payload width of the field in bytes (unmasked).
    #[must_use]
    pub fn payload_width(&self) -> usize {
        match self {
            OxmField::InPort => 4,
            OxmField::EthDst | OxmField::EthSrc => 6,
            OxmField::EthType | OxmField::TcpSrc | OxmField::TcpDst => 2,
            OxmField::Metadata => 8,
            OxmField::IpProto => 1,
            OxmField::Ipv4Src | OxmField::Ipv4Dst => 4,
            OxmField::UdpSrc | OxmField::UdpDst => 2,
        }
    }

    /// Whether the OXM encoding permits a mask on this field.
    #[must_use]
    pub fn maskable(&self) -> bool {
        matches!(
            self,
            OxmField::EthDst
                | OxmField::EthSrc
                | OxmField::Metadata
                | OxmField::Ipv4Src
                | OxmField::Ipv4Dst
        )
    }
}

/// A typed OXM field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum OxmValue {
    /// 8-bit value (`IP_PROTO`).
    U8(u8),
    /// 16-bit value (`ETH_TYPE`, L4 ports).
    U16(u16),
    /// 32-bit value (`IN_PORT`).
    U32(u32),
    /// 64-bit value (`METADATA`).
    U64(u64),
    /// MAC address value.
    Mac(Mac),
    /// IPv4 address value.
    Ipv4(Ipv4Addr),
}

impl OxmValue {
    /// Compare `self` (a packet field) against `value` under an optional `mask`.
    ///
    /// Mismatched variants never match; a mask of a mismatched variant is
    /// treated as an exact compare.
    #[must_use]
    pub fn masked_eq(&self, value: &OxmValue, mask: Option<&OxmValue>) -> bool {
        match (self, value, mask) {
            (OxmValue::U8(a), OxmValue::U8(b), None) => a == b,
            (OxmValue::U16(a), OxmValue::U16(b), None) => a == b,
            (OxmValue::U32(a), OxmValue::U32(b), None) => a == b,
            (OxmValue::U32(a), OxmValue::U32(b), Some(OxmValue::U32(m))) => a & m == b & m,
            (OxmValue::U64(a), OxmValue::U64(b), None) => a == b,
            (OxmValue::U64(a), OxmValue::U64(b), Some(OxmValue::U64(m))) => a & m == b & m,
            (OxmValue::Mac(a), OxmValue::Mac(b), None) => a == b,
            (OxmValue::Mac(a), OxmValue::Mac(b), Some(OxmValue::Mac(m))) => {
                a.0.iter()
                    .zip(b.0.iter())
                    .zip(m.0.iter())
                    .all(|((a, b), m)| a & m == b & m)
            }
            (OxmValue::Ipv4(a), OxmValue::Ipv4(b), None) => a == b,
            (OxmValue::Ipv4(a), OxmValue::Ipv4(b), Some(OxmValue::Ipv4(m))) => {
                let m = u32::from(*m);
                u32::from(*a) & m == u32::from(*b) & m
            }
            _ => false,
        }
    }
}

/// One OXM match field: value plus optional mask.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct OxmTlv {
    /// The field this TLV matches on.
    pub field: OxmField,
    /// The value to compare against.
    pub value: OxmValue,
    /// Optional bit mask; `None` is an exact match.
    pub mask: Option<OxmValue>,
}

impl OxmTlv {
    /// Exact-match TLV.
    #[must_use]
    pub fn exact(field: OxmField, value: OxmValue) -> Self {
        Self {
            field,
            value,
            mask: None,
        }
    }

    /// Masked TLV.
    #[must_use]
    pub fn masked(field: OxmField, value: OxmValue, mask: OxmValue) -> Self {
        Self {
            field,
            value,
            mask: Some(mask),
        }
    }

    /// Exact `ETH_DST` TLV.
    #[must_use]
    pub fn eth_dst(mac: Mac) -> Self {
        Self::exact(OxmField::EthDst, OxmValue::Mac(mac))
    }

    /// Exact `ETH_SRC` TLV.
    #[must_use]
    pub fn eth_src(mac: Mac) -> Self {
        Self::exact(OxmField::EthSrc, OxmValue::Mac(mac))
    }

    /// Exact `IPV4_DST` TLV.
    #[must_use]
    pub fn ipv4_dst(addr: Ipv4Addr) -> Self {
        Self::exact(OxmField::Ipv4Dst, OxmValue::Ipv4(addr))
    }

    /// Masked `IPV4_DST` TLV.
    #[must_use]
    pub fn ipv4_dst_masked(addr: Ipv4Addr, mask: Ipv4Addr) -> Self {
        Self::masked(OxmField::Ipv4Dst, OxmValue::Ipv4(addr), OxmValue::Ipv4(mask))
    }

    /// Size of this TLV on the wire: 4-byte OXM header plus the payload,
    /// doubled when a mask is present.
    #[must_use]
    pub fn wire_size(&self) -> usize {
        let payload = self.field.payload_width();
        4 + if self.mask.is_some() {
            payload * 2
        } else {
            payload
        }
    }
}

/// An ordered set of OXM TLVs, as carried by flow entries and flow-mods.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct Match {
    tlvs: Vec<OxmTlv>,
}

impl Match {
    /// The empty (match-anything) match.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Build a match from TLVs.
    #[must_use]
    pub fn new(tlvs: Vec<OxmTlv>) -> Self {
        Self { tlvs }
    }

    /// True iff the match carries no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tlvs.is_empty()
    }

    /// Size this match would have on the wire: the 4-byte `ofp_match` header
    /// plus all TLVs. An empty match reports 4, which is what the
    /// table-miss-entry rule tests against.
    #[must_use]
    pub fn wire_len(&self) -> usize {
        4 + self.tlvs.iter().map(OxmTlv::wire_size).sum::<usize>()
    }

    /// Look up the TLV for `field`, if present.
    #[must_use]
    pub fn get(&self, field: OxmField) -> Option<&OxmTlv> {
        self.tlvs.iter().find(|tlv| tlv.field == field)
    }

    /// Iterate the TLVs.
    pub fn iter(&self) -> impl Iterator<Item = &OxmTlv> {
        self.tlvs.iter()
    }

    /// Iterate the TLVs mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut OxmTlv> {
        self.tlvs.iter_mut()
    }

    /// True iff every TLV is satisfied by `fields`.
    ///
    /// A field the packet does not carry fails the TLV that names it.
    #[must_use]
    pub fn matches(&self, fields: &FieldValues) -> bool {
        self.tlvs.iter().all(|tlv| {
            fields
                .get(tlv.field)
                .is_some_and(|have| have.masked_eq(&tlv.value, tlv.mask.as_ref()))
        })
    }

    /// An exact-match snapshot of a packet's parsed fields, as carried by
    /// packet-in messages.
    #[must_use]
    pub fn snapshot_of(fields: &FieldValues) -> Match {
        let mut tlvs: Vec<OxmTlv> = fields
            .iter()
            .map(|(field, value)| OxmTlv::exact(field, *value))
            .collect();
        tlvs.sort_by_key(|tlv| tlv.field);
        Match::new(tlvs)
    }

    /// Swap every `ETH_DST` TLV to `ETH_SRC` and vice versa, in place.
    ///
    /// Used by the table 62 → 63 flow synchronization, which installs the
    /// reverse-direction twin of a flow.
    pub fn transpose_eth_addrs(&mut self) {
        for tlv in &mut self.tlvs {
            tlv.field = match tlv.field {
                OxmField::EthDst => OxmField::EthSrc,
                OxmField::EthSrc => OxmField::EthDst,
                other => other,
            };
        }
    }
}

impl Display for Match {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.tlvs.is_empty() {
            return write!(f, "any");
        }
        let mut first = true;
        for tlv in &self.tlvs {
            if !first {
                write!(f, ",")?;
            }
            first = false;
            write!(f, "{:?}", tlv.field)?;
        }
        Ok(())
    }
}

/// The parsed field values of one packet, keyed by OXM field.
///
/// This is the lookup target of [`Match::matches`] and the thing set-field
/// and write-metadata mutate.
#[derive(Debug, Clone, Default)]
pub struct FieldValues {
    fields: ahash::AHashMap<OxmField, OxmValue>,
}

impl FieldValues {
    /// Empty field set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value of `field`, if the packet carries it.
    #[must_use]
    pub fn get(&self, field: OxmField) -> Option<&OxmValue> {
        self.fields.get(&field)
    }

    /// Set (or overwrite) the value of `field`.
    pub fn set(&mut self, field: OxmField, value: OxmValue) {
        self.fields.insert(field, value);
    }

    /// Iterate the fields the packet carries.
    pub fn iter(&self) -> impl Iterator<Item = (OxmField, &OxmValue)> {
        self.fields.iter().map(|(field, value)| (*field, value))
    }

    /// Masked update of the metadata register:
    /// `metadata = (metadata & !mask) | (value & mask)`.
    pub fn write_metadata(&mut self, value: u64, mask: u64) {
        let old = match self.fields.get(&OxmField::Metadata) {
            Some(OxmValue::U64(v)) => *v,
            _ => 0,
        };
        let merged = (old & !mask) | (value & mask);
        self.fields.insert(OxmField::Metadata, OxmValue::U64(merged));
    }
}

/// Prefix length of a contiguous IPv4 mask.
///
/// Returns `Some(len)` iff all one-bits of `mask` are most-significant with
/// no holes (`0xffff_ff00` → 24); `None` when the mask has a hole.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // leading_ones of a u32 is <= 32
pub fn contiguous_prefix_len(mask: u32) -> Option<u8> {
    let len = mask.leading_ones();
    if mask.checked_shl(len).unwrap_or(0) == 0 {
        Some(len as u8)
    } else {
        None
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod test {
    use super::*;

    fn mac(last: u8) -> Mac {
        Mac([0x02, 0, 0, 0, 0, last])
    }

    #[test]
    fn empty_match_wire_len_is_header_only() {
        let m = Match::any();
        assert!(m.is_empty());
        assert_eq!(m.wire_len(), 4);
    }

    #[test]
    fn wire_len_counts_masks_twice() {
        let exact = Match::new(vec![OxmTlv::ipv4_dst(Ipv4Addr::new(10, 0, 0, 1))]);
        assert_eq!(exact.wire_len(), 4 + 4 + 4);
        let masked = Match::new(vec![OxmTlv::ipv4_dst_masked(
            Ipv4Addr::new(10, 0, 0, 0),
            Ipv4Addr::new(255, 255, 255, 0),
        )]);
        assert_eq!(masked.wire_len(), 4 + 4 + 8);
    }

    #[test]
    fn masked_ipv4_compare() {
        let mut fields = FieldValues::new();
        fields.set(OxmField::Ipv4Dst, OxmValue::Ipv4(Ipv4Addr::new(10, 1, 2, 3)));
        let m = Match::new(vec![OxmTlv::ipv4_dst_masked(
            Ipv4Addr::new(10, 1, 2, 0),
            Ipv4Addr::new(255, 255, 255, 0),
        )]);
        assert!(m.matches(&fields));
        fields.set(OxmField::Ipv4Dst, OxmValue::Ipv4(Ipv4Addr::new(10, 1, 3, 3)));
        assert!(!m.matches(&fields));
    }

    #[test]
    fn missing_field_fails_the_match() {
        let fields = FieldValues::new();
        let m = Match::new(vec![OxmTlv::eth_dst(mac(1))]);
        assert!(!m.matches(&fields));
    }

    #[test]
    fn transpose_swaps_both_directions() {
        let mut m = Match::new(vec![
            OxmTlv::eth_dst(mac(1)),
            OxmTlv::eth_src(mac(2)),
            OxmTlv::exact(OxmField::EthType, OxmValue::U16(0x0800)),
        ]);
        m.transpose_eth_addrs();
        assert_eq!(m.get(OxmField::EthDst).unwrap().value, OxmValue::Mac(mac(2)));
        assert_eq!(m.get(OxmField::EthSrc).unwrap().value, OxmValue::Mac(mac(1)));
        assert!(m.get(OxmField::EthType).is_some());
    }

    #[test]
    fn write_metadata_merges_under_mask() {
        let mut fields = FieldValues::new();
        fields.set(OxmField::Metadata, OxmValue::U64(0xaaaa_aaaa_aaaa_aaaa));
        fields.write_metadata(0xffff_ffff_ffff_ffff, 0x0000_0000_ffff_0000);
        assert_eq!(
            fields.get(OxmField::Metadata),
            Some(&OxmValue::U64(0xaaaa_aaaa_ffff_aaaa))
        );
    }

    #[test]
    fn prefix_masks() {
        assert_eq!(contiguous_prefix_len(0x0000_0000), Some(0));
        assert_eq!(contiguous_prefix_len(0xffff_ff00), Some(24));
        assert_eq!(contiguous_prefix_len(0xffff_ffff), Some(32));
        assert_eq!(contiguous_prefix_len(0x8000_0000), Some(1));
        assert_eq!(contiguous_prefix_len(0xff00_ff00), None);
        assert_eq!(contiguous_prefix_len(0x0000_00ff), None);
    }

    #[test]
    fn prefix_mask_contract() {
        bolero::check!().with_type().cloned().for_each(|mask: u32| {
            match contiguous_prefix_len(mask) {
                Some(len) => {
                    // a contiguous mask is exactly `len` ones followed by zeros
                    let expect = if len == 0 { 0 } else { u32::MAX << (32 - u32::from(len)) };
                    assert_eq!(mask, expect);
                }
                None => {
                    assert_ne!(mask.leading_ones() + mask.trailing_zeros(), 32);
                }
            }
        });
    }

    #[test]
    fn write_metadata_contract() {
        bolero::check!()
            .with_type()
            .cloned()
            .for_each(|(old, value, mask): (u64, u64, u64)| {
                let mut fields = FieldValues::new();
                fields.set(OxmField::Metadata, OxmValue::U64(old));
                fields.write_metadata(value, mask);
                let Some(OxmValue::U64(got)) = fields.get(OxmField::Metadata) else {
                    unreachable!("metadata field vanished");
                };
                assert_eq!(*got, (old & !mask) | (value & mask));
            });
    }
}
