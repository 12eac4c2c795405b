use crate::shared::buffer::*;
use crate::shared::dns::errors::*;
use crate::shared::dns::name::*;
use crate::shared::dns::records::*;

/// A single EDNS(0) option, as carried in the OPT pseudo-record's RDATA
/// (RFC 6891 §6.1.2): an (option-code, option-data) pair. The option length
/// is implied by `data.len()` on encode.
#[derive(Debug, Clone)]
pub struct EdnsOption {
    pub code: u16,
    pub data: Vec<u8>,
}

/// View-selection hint codes carried as EDNS options. These are not an
/// IANA-registered use of the option-code space; they're local to this
/// deployment's client/server pairing.
pub const OPT_TARGET_ZONE: u16 = 65230;
pub const OPT_TARGET_VIEW: u16 = 65231;

/// UDP payload size this server advertises in every outgoing OPT record.
pub const EDNS_ADVERTISED_PAYLOAD_SIZE: u16 = 4096;

/// The EDNS(0) pseudo-record (RFC 6891). It is carried as an additional-section
/// "record" with owner name root, type 41 (OPT), but its class/ttl fields are
/// repurposed to carry the requester's UDP payload size and the extended
/// rcode/version/flags, so it is modeled separately from [`Record`] rather
/// than as one more variant of that enum.
#[derive(Debug, Clone)]
pub struct Edns {
    pub udp_payload_size: u16,
    pub extended_rcode: u8,
    pub version: u8,
    pub do_bit: bool,
    pub options: Vec<EdnsOption>,
}

impl Edns {
    pub const OPT_TYPE: u16 = 41;

    /// A default OPT record advertising the given payload size, no extended
    /// flags, and no options. Options are appended separately.
    pub fn new(udp_payload_size: u16) -> Self {
        Edns {
            udp_payload_size,
            extended_rcode: 0,
            version: 0,
            do_bit: false,
            options: vec![],
        }
    }

    pub fn with_option(mut self, code: u16, data: Vec<u8>) -> Self {
        self.options.push(EdnsOption { code, data });
        self
    }

    /// Returns the first option matching `code`, if present.
    pub fn option(&self, code: u16) -> Option<&EdnsOption> {
        self.options.iter().find(|o| o.code == code)
    }

    // Decode the class/ttl/rdlength/rdata tail of the OPT pseudo-record. The
    // owner name and type (41) are assumed already consumed by the caller.
    pub(crate) fn decode_rest(buffer: &mut BitsBuf) -> Result<Edns, ParsingErr> {
        let udp_payload_size = buffer.read_u16().ok_or(ParsingErr::BytesEnd)?;
        let ttl = buffer.read_u32().ok_or(ParsingErr::BytesEnd)?;
        let extended_rcode = ((ttl >> 24) & 0xff) as u8;
        let version = ((ttl >> 16) & 0xff) as u8;
        let flags = (ttl & 0xffff) as u16;
        let do_bit = flags & 0b1000_0000_0000_0000 != 0;

        let data_len = buffer.read_u16().ok_or(ParsingErr::BytesEnd)?;
        let before = buffer.read_pos();
        let mut options = vec![];
        while buffer.read_pos() - before < (data_len as usize) * 8 {
            let code = buffer.read_u16().ok_or(ParsingErr::BytesEnd)?;
            let len = buffer.read_u16().ok_or(ParsingErr::BytesEnd)?;
            let data = buffer
                .read_bytes_vec(len as usize)
                .ok_or(ParsingErr::BytesEnd)?;
            options.push(EdnsOption { code, data });
        }
        if buffer.read_pos() - before != (data_len as usize) * 8 {
            return Err(ParsingErr::MalformedOpt("option lengths overrun rdlength"));
        }

        Ok(Edns {
            udp_payload_size,
            extended_rcode,
            version,
            do_bit,
            options,
        })
    }

    pub(crate) fn encode_to_buf(&self, buffer: &mut BitsBuf) {
        buffer.write_bytes(&Name::root().to_bytes());
        buffer.write_u16(Self::OPT_TYPE);
        buffer.write_u16(self.udp_payload_size);

        let mut flags: u16 = 0;
        if self.do_bit {
            flags |= 0b1000_0000_0000_0000;
        }
        let ttl = ((self.extended_rcode as u32) << 24) | ((self.version as u32) << 16) | flags as u32;
        buffer.write_u32(ttl);

        let rdlen: usize = self.options.iter().map(|o| 4 + o.data.len()).sum();
        buffer.write_u16(rdlen as u16);
        for opt in &self.options {
            buffer.write_u16(opt.code);
            buffer.write_u16(opt.data.len() as u16);
            buffer.write_bytes(&opt.data);
        }
    }
}

/// Either an ordinary record or the EDNS OPT pseudo-record, as found while
/// walking the additional section (the only section where OPT appears).
pub(crate) enum Additional {
    Record(Record),
    Edns(Edns),
}

/// Decode one entry of the additional section, routing to the OPT pseudo-record
/// decoder when its type is 41 and to the ordinary record decoder otherwise.
pub(crate) fn decode_additional(buffer: &mut BitsBuf) -> Result<Additional, ParsingErr> {
    let node = Name::from_bytes(buffer)?;
    let rtype_num = buffer.read_u16().ok_or(ParsingErr::BytesEnd)?;

    if rtype_num == Edns::OPT_TYPE {
        if node != Name::root() {
            return Err(ParsingErr::MalformedOpt("OPT owner name must be root"));
        }
        return Ok(Additional::Edns(Edns::decode_rest(buffer)?));
    }

    let rec_type = decode_record_type_from_num(rtype_num, buffer)?;
    let class = decode_class(buffer.read_u16().ok_or(ParsingErr::BytesEnd)?)?;
    let ttl = buffer.read_u32().ok_or(ParsingErr::BytesEnd)?;
    let data_len = buffer.read_u16().ok_or(ParsingErr::BytesEnd)?;
    let record = Record::decode_rdata(node, rec_type, class, ttl, data_len, buffer)?;
    Ok(Additional::Record(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opt_round_trips_with_options() {
        let edns = Edns::new(4096)
            .with_option(OPT_TARGET_ZONE, b"example.".to_vec())
            .with_option(OPT_TARGET_VIEW, b"internal".to_vec());

        let mut buf = BitsBuf::new();
        edns.encode_to_buf(&mut buf);
        buf.set_read_pos(0);

        match decode_additional(&mut buf).unwrap() {
            Additional::Edns(decoded) => {
                assert_eq!(decoded.udp_payload_size, 4096);
                assert_eq!(decoded.options.len(), 2);
                assert_eq!(decoded.option(OPT_TARGET_ZONE).unwrap().data, b"example.".to_vec());
                assert_eq!(decoded.option(OPT_TARGET_VIEW).unwrap().data, b"internal".to_vec());
            }
            Additional::Record(_) => panic!("expected an Edns entry"),
        }
    }
}
