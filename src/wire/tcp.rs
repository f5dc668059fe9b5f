use byteorder::{ByteOrder, NetworkEndian};
use core::cmp::Ordering;
use core::{fmt, i32, ops};

use super::{Error, Result};
use crate::phy::ChecksumCapabilities;
use crate::wire::ip::checksum;
use crate::wire::{IpAddress, IpProtocol};

/// A TCP sequence number.
///
/// A sequence number is a free-running 32-bit integer, i.e. a number
/// in the finite field modulo 2<sup>32</sup>. Due to its ring properties,
/// addition and subtraction are defined on it, but not comparison.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeqNumber(pub i32);

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0 as u32)
    }
}

impl ops::Add<usize> for SeqNumber {
    type Output = SeqNumber;

    fn add(self, rhs: usize) -> SeqNumber {
        SeqNumber(self.0.wrapping_add(rhs as i32))
    }
}

impl ops::Sub<usize> for SeqNumber {
    type Output = SeqNumber;

    fn sub(self, rhs: usize) -> SeqNumber {
        SeqNumber(self.0.wrapping_sub(rhs as i32))
    }
}

impl ops::AddAssign<usize> for SeqNumber {
    fn add_assign(&mut self, rhs: usize) {
        self.0 = self.0.wrapping_add(rhs as i32);
    }
}

impl ops::Sub<SeqNumber> for SeqNumber {
    type Output = usize;

    fn sub(self, rhs: SeqNumber) -> usize {
        let result = self.0.wrapping_sub(rhs.0);
        if result < 0 {
            panic!("attempt to subtract with overflow")
        }
        result as usize
    }
}

impl PartialOrd for SeqNumber {
    fn partial_cmp(&self, other: &SeqNumber) -> Option<Ordering> {
        self.0.wrapping_sub(other.0).partial_cmp(&0)
    }
}

impl SeqNumber {
    /// Return the sequence number immediately after this one, wrapping at the
    /// boundary of the sequence space.
    pub fn checked_sub(self, rhs: usize) -> Option<SeqNumber> {
        if self.0.checked_sub(rhs as i32).is_some() {
            Some(self - rhs)
        } else {
            None
        }
    }
}

/// TCP control flags, reduced to the one-of-{None,Syn,Fin,Rst} a segment
/// carries on its control bit (spec.md never needs the PSH/URG bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    None,
    Syn,
    Fin,
    Rst,
}

impl Control {
    /// Whether this control flag consumes one byte of sequence space (SYN and
    /// FIN both do, per RFC 793).
    pub fn len(self) -> usize {
        match self {
            Control::Syn | Control::Fin => 1,
            _ => 0,
        }
    }

    pub fn quash_psh(self) -> Control {
        self
    }
}

/// A TCP option kind octet (spec.md §6: "Options supported: MSS (kind 2),
/// WScale (3), SACK-permitted (4), SACK (5), Timestamp (8); other options are
/// skipped safely").
mod field {
    use crate::wire::field::*;

    pub const SRC_PORT: Field = 0..2;
    pub const DST_PORT: Field = 2..4;
    pub const SEQ_NUM: Field = 4..8;
    pub const ACK_NUM: Field = 8..12;
    pub const FLAGS: Field = 12..14;
    pub const WINDOW: Field = 14..16;
    pub const CHECKSUM: Field = 16..18;
    pub const URGENT: Field = 18..20;

    pub const OPT_END: u8 = 0x00;
    pub const OPT_NOP: u8 = 0x01;
    pub const OPT_MSS: u8 = 0x02;
    pub const OPT_WS: u8 = 0x03;
    pub const OPT_SACKPERM: u8 = 0x04;
    pub const OPT_SACKRANGE: u8 = 0x05;
    pub const OPT_TSTAMP: u8 = 0x08;

    pub fn OPTIONS(data_offset: u8) -> Field {
        URGENT.end..(data_offset as usize * 4)
    }

    pub const FIN: u16 = 0x001;
    pub const SYN: u16 = 0x002;
    pub const RST: u16 = 0x004;
    pub const PSH: u16 = 0x008;
    pub const ACK: u16 = 0x010;
    pub const URG: u16 = 0x020;
    pub const ECE: u16 = 0x040;
    pub const CWR: u16 = 0x080;
    pub const NS: u16 = 0x100;
}

pub const HEADER_LEN: usize = field::URGENT.end;

/// A read/write wrapper around a Transmission Control Protocol packet buffer.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

#[allow(clippy::len_without_is_empty)]
impl<T: AsRef<[u8]>> Packet<T> {
    pub const fn new_unchecked(buffer: T) -> Packet<T> {
        Packet { buffer }
    }

    pub fn new_checked(buffer: T) -> Result<Packet<T>> {
        let packet = Self::new_unchecked(buffer);
        packet.check_len()?;
        Ok(packet)
    }

    pub fn check_len(&self) -> Result<()> {
        let len = self.buffer.as_ref().len();
        if len < HEADER_LEN {
            return Err(Error);
        }
        let data_offset = self.data_offset() as usize;
        if data_offset < 5 || data_offset as usize * 4 > len {
            return Err(Error);
        }
        Ok(())
    }

    pub fn into_inner(self) -> T {
        self.buffer
    }

    #[inline]
    pub fn src_port(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::SRC_PORT])
    }

    #[inline]
    pub fn dst_port(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::DST_PORT])
    }

    #[inline]
    pub fn seq_number(&self) -> SeqNumber {
        let data = self.buffer.as_ref();
        SeqNumber(NetworkEndian::read_i32(&data[field::SEQ_NUM]))
    }

    #[inline]
    pub fn ack_number(&self) -> SeqNumber {
        let data = self.buffer.as_ref();
        SeqNumber(NetworkEndian::read_i32(&data[field::ACK_NUM]))
    }

    #[inline]
    pub fn data_offset(&self) -> u8 {
        let data = self.buffer.as_ref();
        data[field::FLAGS.start] >> 4
    }

    #[inline]
    fn flags(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::FLAGS]) & 0x1ff
    }

    #[inline]
    pub fn fin(&self) -> bool {
        self.flags() & field::FIN != 0
    }
    #[inline]
    pub fn syn(&self) -> bool {
        self.flags() & field::SYN != 0
    }
    #[inline]
    pub fn rst(&self) -> bool {
        self.flags() & field::RST != 0
    }
    #[inline]
    pub fn psh(&self) -> bool {
        self.flags() & field::PSH != 0
    }
    #[inline]
    pub fn ack(&self) -> bool {
        self.flags() & field::ACK != 0
    }
    #[inline]
    pub fn urg(&self) -> bool {
        self.flags() & field::URG != 0
    }
    #[inline]
    pub fn ece(&self) -> bool {
        self.flags() & field::ECE != 0
    }
    #[inline]
    pub fn cwr(&self) -> bool {
        self.flags() & field::CWR != 0
    }

    #[inline]
    pub fn window_len(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::WINDOW])
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::CHECKSUM])
    }

    #[inline]
    pub fn urgent_at(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::URGENT])
    }

    pub fn header_len(&self) -> usize {
        self.data_offset() as usize * 4
    }

    pub fn verify_checksum(&self, src_addr: &IpAddress, dst_addr: &IpAddress) -> bool {
        let data = self.buffer.as_ref();
        checksum::combine(&[
            checksum::pseudo_header(src_addr, dst_addr, IpProtocol::Tcp, data.len() as u32),
            checksum::data(data),
        ]) == !0
    }

    /// Returns an iterator over the TCP options carried by this packet,
    /// skipping unrecognised option kinds safely (spec.md §6).
    pub fn options(&self) -> TcpOptionIter {
        let data = self.buffer.as_ref();
        let range = field::OPTIONS(self.data_offset());
        TcpOptionIter::new(&data[range.start.min(data.len())..range.end.min(data.len())])
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Packet<&'a T> {
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        let data = self.buffer.as_ref();
        &data[self.header_len()..]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    #[inline]
    pub fn set_src_port(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::SRC_PORT], value)
    }

    #[inline]
    pub fn set_dst_port(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::DST_PORT], value)
    }

    #[inline]
    pub fn set_seq_number(&mut self, value: SeqNumber) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_i32(&mut data[field::SEQ_NUM], value.0)
    }

    #[inline]
    pub fn set_ack_number(&mut self, value: SeqNumber) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_i32(&mut data[field::ACK_NUM], value.0)
    }

    #[inline]
    pub fn set_data_offset(&mut self, value: u8) {
        let data = self.buffer.as_mut();
        data[field::FLAGS.start] = (data[field::FLAGS.start] & 0x0f) | (value << 4);
    }

    fn set_flags(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        let raw = NetworkEndian::read_u16(&data[field::FLAGS]);
        NetworkEndian::write_u16(&mut data[field::FLAGS], (raw & 0xfe00) | (value & 0x1ff));
    }

    #[inline]
    pub fn set_fin(&mut self, value: bool) {
        self.set_flag(field::FIN, value)
    }
    #[inline]
    pub fn set_syn(&mut self, value: bool) {
        self.set_flag(field::SYN, value)
    }
    #[inline]
    pub fn set_rst(&mut self, value: bool) {
        self.set_flag(field::RST, value)
    }
    #[inline]
    pub fn set_psh(&mut self, value: bool) {
        self.set_flag(field::PSH, value)
    }
    #[inline]
    pub fn set_ack(&mut self, value: bool) {
        self.set_flag(field::ACK, value)
    }
    #[inline]
    pub fn set_urg(&mut self, value: bool) {
        self.set_flag(field::URG, value)
    }
    #[inline]
    pub fn set_ece(&mut self, value: bool) {
        self.set_flag(field::ECE, value)
    }
    #[inline]
    pub fn set_cwr(&mut self, value: bool) {
        self.set_flag(field::CWR, value)
    }

    fn set_flag(&mut self, mask: u16, value: bool) {
        let data = self.buffer.as_ref();
        let mut flags = NetworkEndian::read_u16(&data[field::FLAGS]) & 0x1ff;
        if value {
            flags |= mask;
        } else {
            flags &= !mask;
        }
        self.set_flags(flags);
    }

    #[inline]
    pub fn set_window_len(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::WINDOW], value)
    }

    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::CHECKSUM], value)
    }

    #[inline]
    pub fn set_urgent_at(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::URGENT], value)
    }

    pub fn options_mut(&mut self) -> &mut [u8] {
        let header_len = self.header_len();
        let data = self.buffer.as_mut();
        &mut data[field::URGENT.end..header_len]
    }

    pub fn fill_checksum(&mut self, src_addr: &IpAddress, dst_addr: &IpAddress) {
        self.set_checksum(0);
        let checksum = {
            let data = self.buffer.as_ref();
            !checksum::combine(&[
                checksum::pseudo_header(src_addr, dst_addr, IpProtocol::Tcp, data.len() as u32),
                checksum::data(data),
            ])
        };
        self.set_checksum(checksum)
    }

    #[inline]
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let header_len = self.header_len();
        let data = self.buffer.as_mut();
        &mut data[header_len..]
    }
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Packet<T> {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

/// A single, already-decoded TCP option (spec.md §6 "kind"s).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TcpOption<'a> {
    EndOfList,
    NoOperation,
    MaxSegmentSize(u16),
    WindowScale(u8),
    SackPermitted,
    SackRange([Option<(u32, u32)>; 3]),
    Timestamp { tsval: u32, tsecr: u32 },
    Unknown { kind: u8, data: &'a [u8] },
}

impl<'a> TcpOption<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<(&'a [u8], TcpOption<'a>)> {
        let (length, option);
        match *buffer.first().ok_or(Error)? {
            field::OPT_END => {
                length = 1;
                option = TcpOption::EndOfList;
            }
            field::OPT_NOP => {
                length = 1;
                option = TcpOption::NoOperation;
            }
            kind => {
                length = *buffer.get(1).ok_or(Error)? as usize;
                let contents = buffer.get(2..length).ok_or(Error)?;
                match (kind, length) {
                    (field::OPT_END, _) | (field::OPT_NOP, _) => unreachable!(),
                    (field::OPT_MSS, 4) => {
                        option = TcpOption::MaxSegmentSize(NetworkEndian::read_u16(contents))
                    }
                    (field::OPT_WS, 3) => option = TcpOption::WindowScale(contents[0]),
                    (field::OPT_SACKPERM, 2) => option = TcpOption::SackPermitted,
                    (field::OPT_SACKRANGE, n) if n >= 2 && (n - 2) % 8 == 0 => {
                        let mut ranges = [None, None, None];
                        for (slot, chunk) in ranges.iter_mut().zip(contents.chunks(8)) {
                            *slot = Some((
                                NetworkEndian::read_u32(&chunk[0..4]),
                                NetworkEndian::read_u32(&chunk[4..8]),
                            ));
                        }
                        option = TcpOption::SackRange(ranges);
                    }
                    (field::OPT_TSTAMP, 10) => {
                        let tsval = NetworkEndian::read_u32(&contents[0..4]);
                        let tsecr = NetworkEndian::read_u32(&contents[4..8]);
                        option = TcpOption::Timestamp { tsval, tsecr };
                    }
                    (kind, _) => option = TcpOption::Unknown { kind, data: contents },
                }
            }
        }
        Ok((&buffer[length..], option))
    }

    pub fn buffer_len(&self) -> usize {
        match self {
            TcpOption::EndOfList | TcpOption::NoOperation => 1,
            TcpOption::MaxSegmentSize(_) => 4,
            TcpOption::WindowScale(_) => 3,
            TcpOption::SackPermitted => 2,
            TcpOption::SackRange(s) => 2 + 8 * s.iter().flatten().count(),
            TcpOption::Timestamp { .. } => 10,
            TcpOption::Unknown { data, .. } => 2 + data.len(),
        }
    }

    pub fn emit<'b>(&self, buffer: &'b mut [u8]) -> &'b mut [u8] {
        let length;
        match *self {
            TcpOption::EndOfList => {
                length = 1;
                buffer[0] = field::OPT_END;
            }
            TcpOption::NoOperation => {
                length = 1;
                buffer[0] = field::OPT_NOP;
            }
            TcpOption::MaxSegmentSize(value) => {
                length = 4;
                buffer[0] = field::OPT_MSS;
                buffer[1] = 4;
                NetworkEndian::write_u16(&mut buffer[2..4], value);
            }
            TcpOption::WindowScale(value) => {
                length = 3;
                buffer[0] = field::OPT_WS;
                buffer[1] = 3;
                buffer[2] = value;
            }
            TcpOption::SackPermitted => {
                length = 2;
                buffer[0] = field::OPT_SACKPERM;
                buffer[1] = 2;
            }
            TcpOption::SackRange(ranges) => {
                length = self.buffer_len();
                buffer[0] = field::OPT_SACKRANGE;
                buffer[1] = length as u8;
                let mut offset = 2;
                for range in ranges.iter().flatten() {
                    NetworkEndian::write_u32(&mut buffer[offset..offset + 4], range.0);
                    NetworkEndian::write_u32(&mut buffer[offset + 4..offset + 8], range.1);
                    offset += 8;
                }
            }
            TcpOption::Timestamp { tsval, tsecr } => {
                length = 10;
                buffer[0] = field::OPT_TSTAMP;
                buffer[1] = 10;
                NetworkEndian::write_u32(&mut buffer[2..6], tsval);
                NetworkEndian::write_u32(&mut buffer[6..10], tsecr);
            }
            TcpOption::Unknown { kind, data } => {
                length = 2 + data.len();
                buffer[0] = kind;
                buffer[1] = length as u8;
                buffer[2..length].copy_from_slice(data);
            }
        }
        &mut buffer[length..]
    }
}

/// Iterator over the raw option bytes of a TCP header.
pub struct TcpOptionIter<'a> {
    data: &'a [u8],
    stopped: bool,
}

impl<'a> TcpOptionIter<'a> {
    fn new(data: &'a [u8]) -> TcpOptionIter<'a> {
        TcpOptionIter {
            data,
            stopped: false,
        }
    }
}

impl<'a> Iterator for TcpOptionIter<'a> {
    type Item = Result<TcpOption<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stopped || self.data.is_empty() {
            return None;
        }
        match TcpOption::parse(self.data) {
            Ok((rest, TcpOption::EndOfList)) => {
                self.stopped = true;
                let _ = rest;
                None
            }
            Ok((rest, option)) => {
                self.data = rest;
                Some(Ok(option))
            }
            Err(err) => {
                // A single malformed option stops the walk; bytes already
                // parsed are still honored (spec.md §7: "malformed options
                // (skipped after a single option)").
                self.stopped = true;
                Some(Err(err))
            }
        }
    }
}

/// A high-level representation of a TCP header and the options that ride
/// along with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repr {
    pub src_port: u16,
    pub dst_port: u16,
    pub control: Control,
    pub seq_number: SeqNumber,
    pub ack_number: Option<SeqNumber>,
    pub window_len: u16,
    pub window_scale: Option<u8>,
    pub max_seg_size: Option<u16>,
    pub sack_permitted: bool,
    pub sack_ranges: [Option<(u32, u32)>; 3],
    pub timestamp: Option<(u32, u32)>,
    pub ece: bool,
    pub cwr: bool,
    pub payload_len: usize,
}

impl Repr {
    pub fn parse<T>(
        packet: &Packet<&T>,
        src_addr: &IpAddress,
        dst_addr: &IpAddress,
        checksum_caps: &ChecksumCapabilities,
    ) -> Result<Repr>
    where
        T: AsRef<[u8]> + ?Sized,
    {
        packet.check_len()?;

        if packet.dst_port() == 0 {
            return Err(Error);
        }
        if checksum_caps.tcp.rx() && !packet.verify_checksum(src_addr, dst_addr) {
            return Err(Error);
        }

        let control = match (packet.syn(), packet.fin(), packet.rst()) {
            (false, false, false) => Control::None,
            (true, false, false) => Control::Syn,
            (false, true, false) => Control::Fin,
            (false, false, true) => Control::Rst,
            // A packet with two or more of SYN/FIN/RST set is nonsensical;
            // treat it the way an unacceptable segment would be treated.
            _ => return Err(Error),
        };
        let ack_number = packet.ack().then(|| packet.ack_number());

        let mut max_seg_size = None;
        let mut window_scale = None;
        let mut sack_permitted = false;
        let mut sack_ranges = [None, None, None];
        let mut timestamp = None;

        for option in packet.options() {
            match option {
                Ok(TcpOption::MaxSegmentSize(value)) => max_seg_size = Some(value),
                Ok(TcpOption::WindowScale(value)) => window_scale = Some(value),
                Ok(TcpOption::SackPermitted) => sack_permitted = true,
                Ok(TcpOption::SackRange(slots)) => sack_ranges = slots,
                Ok(TcpOption::Timestamp { tsval, tsecr }) => timestamp = Some((tsval, tsecr)),
                Ok(_) => {}
                Err(_) => break,
            }
        }

        Ok(Repr {
            src_port: packet.src_port(),
            dst_port: packet.dst_port(),
            control,
            seq_number: packet.seq_number(),
            ack_number,
            window_len: packet.window_len(),
            window_scale,
            max_seg_size,
            sack_permitted,
            sack_ranges,
            timestamp,
            ece: packet.ece(),
            cwr: packet.cwr(),
            payload_len: packet.payload().len(),
        })
    }

    /// Length of the segment in sequence-number space: payload bytes plus one
    /// for SYN/FIN each (spec.md §3: `snd_nxt - snd_una` accounting).
    pub fn segment_len(&self) -> usize {
        self.payload_len + self.control.len()
    }

    pub fn options_len(&self) -> usize {
        let mut len = 0;
        if self.max_seg_size.is_some() {
            len += 4;
        }
        if let Some(scale) = self.window_scale {
            let _ = scale;
            len += 3;
        }
        if self.sack_permitted {
            len += 2;
        }
        let sack_count = self.sack_ranges.iter().flatten().count();
        if sack_count > 0 {
            len += 2 + 8 * sack_count;
        }
        if self.timestamp.is_some() {
            len += 10;
        }
        // Round up to a 4-byte boundary with NOPs, as every real stack does.
        (len + 3) / 4 * 4
    }

    pub fn header_len(&self) -> usize {
        HEADER_LEN + self.options_len()
    }

    pub fn emit<T>(&self, packet: &mut Packet<&mut T>)
    where
        T: AsRef<[u8]> + AsMut<[u8]> + ?Sized,
    {
        packet.set_src_port(self.src_port);
        packet.set_dst_port(self.dst_port);
        packet.set_seq_number(self.seq_number);
        packet.set_ack_number(self.ack_number.unwrap_or(SeqNumber(0)));
        packet.set_fin(self.control == Control::Fin);
        packet.set_syn(self.control == Control::Syn);
        packet.set_rst(self.control == Control::Rst);
        packet.set_ack(self.ack_number.is_some());
        packet.set_ece(self.ece);
        packet.set_cwr(self.cwr);
        packet.set_window_len(self.window_len);
        packet.set_urgent_at(0);
        packet.set_data_offset((self.header_len() / 4) as u8);
        packet.set_checksum(0);

        {
            let mut options = &mut packet.options_mut()[..];
            if let Some(value) = self.max_seg_size {
                options = TcpOption::MaxSegmentSize(value).emit(options);
            }
            if let Some(value) = self.window_scale {
                options = TcpOption::WindowScale(value).emit(options);
            }
            if self.sack_permitted {
                options = TcpOption::SackPermitted.emit(options);
            } else if self.ack_number.is_some() && self.sack_ranges.iter().any(Option::is_some) {
                options = TcpOption::NoOperation.emit(options);
                options = TcpOption::NoOperation.emit(options);
            }
            if let Some((tsval, tsecr)) = self.timestamp {
                options = TcpOption::Timestamp { tsval, tsecr }.emit(options);
            }
            if self.sack_ranges.iter().any(Option::is_some) {
                options = TcpOption::SackRange(self.sack_ranges).emit(options);
            }
            if !options.is_empty() {
                TcpOption::EndOfList.emit(options);
            }
        }
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TCP src={} dst={}", self.src_port, self.dst_port)?;
        match self.control {
            Control::Syn => write!(f, " syn")?,
            Control::Fin => write!(f, " fin")?,
            Control::Rst => write!(f, " rst")?,
            Control::None => {}
        }
        write!(f, " seq={}", self.seq_number)?;
        if let Some(ack) = self.ack_number {
            write!(f, " ack={ack}")?;
        }
        write!(f, " win={}", self.window_len)?;
        if let Some((tsval, tsecr)) = self.timestamp {
            write!(f, " tsval={tsval} tsecr={tsecr}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Ipv4Address;

    fn addrs() -> (IpAddress, IpAddress) {
        (
            IpAddress::Ipv4(Ipv4Address::new(192, 168, 1, 1)),
            IpAddress::Ipv4(Ipv4Address::new(192, 168, 1, 2)),
        )
    }

    #[test]
    fn seq_number_wraps() {
        let a = SeqNumber(i32::MAX);
        let b = a + 2usize;
        assert!(b.0 < 0);
        assert_eq!(b - a, 2);
    }

    #[test]
    fn seq_number_ordering_across_wrap() {
        let a = SeqNumber(i32::MAX - 1);
        let b = a + 5usize;
        assert!(b > a);
    }

    #[test]
    fn round_trip_syn_options() {
        let repr = Repr {
            src_port: 49152,
            dst_port: 80,
            control: Control::Syn,
            seq_number: SeqNumber(1000),
            ack_number: None,
            window_len: 65535,
            window_scale: Some(7),
            max_seg_size: Some(1460),
            sack_permitted: true,
            sack_ranges: [None, None, None],
            timestamp: Some((42, 0)),
            ece: false,
            cwr: false,
            payload_len: 0,
        };
        let mut buffer = vec![0u8; repr.header_len()];
        {
            let mut packet = Packet::new_unchecked(&mut buffer);
            repr.emit(&mut packet);
        }
        let (src, dst) = addrs();
        let packet = Packet::new_checked(&buffer).unwrap();
        let parsed = Repr::parse(
            &Packet::new_unchecked(&buffer),
            &src,
            &dst,
            &ChecksumCapabilities::ignored(),
        )
        .unwrap();
        assert_eq!(parsed.max_seg_size, Some(1460));
        assert_eq!(parsed.window_scale, Some(7));
        assert!(parsed.sack_permitted);
        assert_eq!(parsed.timestamp, Some((42, 0)));
        assert_eq!(packet.syn(), true);
    }

    #[test]
    fn unknown_option_skipped_safely() {
        // kind=254 len=4, followed by a valid MSS option; parse must not fail
        // and must still see the MSS.
        let mut opts = vec![254u8, 4, 0xaa, 0xbb];
        TcpOption::MaxSegmentSize(1460).emit(&mut {
            let mut tail = vec![0u8; 4];
            opts.append(&mut tail);
            opts.clone()
        });
        // Directly exercise the iterator instead, simpler and equivalent.
        let raw = [254u8, 4, 0, 0, 0x02, 4, 0x05, 0xb4];
        let iter = TcpOptionIter::new(&raw);
        let parsed: Vec<_> = iter.collect();
        assert_eq!(parsed.len(), 2);
        assert!(matches!(parsed[0], Ok(TcpOption::Unknown { kind: 254, .. })));
        assert!(matches!(parsed[1], Ok(TcpOption::MaxSegmentSize(1460))));
    }
}
