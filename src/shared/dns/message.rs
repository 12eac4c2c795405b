use crate::shared::buffer::*;
use crate::shared::dns::edns::{decode_additional, Additional, Edns};
use crate::shared::dns::errors::*;
use crate::shared::dns::header::*;
use crate::shared::dns::questions::*;
use crate::shared::dns::records::*;

/// Maximum size of a single UDP datagram this server will ever write onto
/// the wire. Larger responses are truncated (TC bit set, RFC 1035 §4.1.1)
/// down to this size rather than fragmented.
pub const MAX_UDP_LEN_BYTES: usize = 65527;

/// Represents a complete dns message. Contains the [`Header`], which fields
/// must be concordant with the [`Question`]s and [`Record`]s carried in the other
/// message fields (). The EDNS(0) OPT pseudo-record, if present, is carried
/// separately from `additionals` since its wire layout repurposes the
/// class/ttl fields.
#[derive(Debug)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<Record>,
    pub authorities: Vec<Record>,
    pub additionals: Vec<Record>,
    pub edns: Option<Edns>,
}

impl Message {
    /// Decode a dns [`Message`] from the provided bytes. Unsupported features are
    /// detected and the function returns proper parsing errors. Unknown records
    /// types still cause its record/question bytes to be consumed. In general we
    /// want to make sure no unsupported features enters or exits the system.
    pub fn decode_from_bytes(bytes: &[u8]) -> Result<Message, MessageErr> {
        let mut buffer = BitsBuffer::from_raw_bytes(&bytes);

        let header = match Header::decode_from_buf(&mut buffer) {
            Err(err) => return Err(MessageErr::HeaderErr(err)),
            Ok(header) => header,
        };
        if let Err(err) = header.is_supported() {
            return Err(MessageErr::HeaderErr(err));
        }

        let mut questions = Vec::with_capacity(header.questions_count as usize);
        let mut answers = Vec::with_capacity(header.answers_count as usize);
        let mut authorities = Vec::with_capacity(header.authorities_count as usize);
        let mut additionals = Vec::with_capacity(header.additionals_count as usize);
        let mut edns = None;

        for i in 0..header.questions_count as usize {
            let decoded_question = Question::decode_from_buf(&mut buffer);
            match decoded_question {
                Err(ParsingErr::UnknownType(_)) => continue,
                Err(err) => return Err(MessageErr::QuestionErr(i, err)),
                Ok(v) => questions.push(v),
            };
        }
        for i in 0..header.answers_count as usize {
            let decoded_answer = Record::decode_from_buf(&mut buffer);
            match decoded_answer {
                Err(ParsingErr::UnknownType(_)) => continue,
                Err(err) => return Err(MessageErr::AnswerErr(i, err)),
                Ok(v) => answers.push(v),
            };
        }
        for i in 0..header.authorities_count as usize {
            let decoded_authority = Record::decode_from_buf(&mut buffer);
            match decoded_authority {
                Err(ParsingErr::UnknownType(_)) => continue,
                Err(err) => return Err(MessageErr::AuthorityErr(i, err)),
                Ok(v) => authorities.push(v),
            };
        }
        for i in 0..header.additionals_count as usize {
            match decode_additional(&mut buffer) {
                Err(ParsingErr::UnknownType(_)) => continue,
                Err(err) => return Err(MessageErr::AdditionalErr(i, err)),
                Ok(Additional::Record(v)) => additionals.push(v),
                Ok(Additional::Edns(v)) => edns = Some(v),
            };
        }

        Ok(Message {
            header,
            questions,
            answers,
            authorities,
            additionals,
            edns,
        })
    }

    /// Encode a dns [`Message`] to raw bytes, returning a bytes vector. The
    /// function panics if some unsupported class or types are provided (to
    /// maintain invariants about supported features). Callers are responsible
    /// for keeping `header.*_count` fields concordant with the section vectors
    /// and with whether `edns` is set (the OPT pseudo-record adds one to
    /// `additionals_count` on the wire without being part of `additionals`).
    pub fn encode_to_bytes(&self) -> Result<Vec<u8>, MessageErr> {
        let mut buffer = BitsBuffer::new();
        self.header.encode_to_buf(&mut buffer);

        for i in 0..self.header.questions_count as usize {
            match self.questions[i].encode_to_buf(&mut buffer) {
                Err(err) => return Err(MessageErr::QuestionErr(i, err)),
                Ok(v) => v,
            }
        }
        for i in 0..self.header.answers_count as usize {
            match self.answers[i].encode_to_buf(&mut buffer) {
                Err(err) => return Err(MessageErr::AnswerErr(i, err)),
                Ok(v) => v,
            }
        }
        for i in 0..self.header.authorities_count as usize {
            match self.authorities[i].encode_to_buf(&mut buffer) {
                Err(err) => return Err(MessageErr::AuthorityErr(i, err)),
                Ok(v) => v,
            }
        }
        for i in 0..self.additionals.len() {
            match self.additionals[i].encode_to_buf(&mut buffer) {
                Err(err) => return Err(MessageErr::AdditionalErr(i, err)),
                Ok(v) => v,
            }
        }
        if let Some(edns) = &self.edns {
            edns.encode_to_buf(&mut buffer);
        }

        Ok(buffer.into_vec())
    }

    /// Encode the message like [`Message::encode_to_bytes`], but never return
    /// more than `max_len` bytes. When the full encoding overruns `max_len`,
    /// records are dropped from the end of the additional, then authority,
    /// then answer sections (the EDNS OPT pseudo-record and question section
    /// are never dropped) and the header's truncated (TC) bit is set, per
    /// RFC 1035 §4.1.1 / §6.2 UDP truncation behavior.
    pub fn encode_to_bytes_trunc(&self, max_len: usize) -> Result<Vec<u8>, MessageErr> {
        let full = self.encode_to_bytes()?;
        if full.len() <= max_len {
            return Ok(full);
        }

        let mut truncated = Message {
            header: self.header.clone(),
            questions: self.questions.clone(),
            answers: self.answers.clone(),
            authorities: self.authorities.clone(),
            additionals: self.additionals.clone(),
            edns: self.edns.clone(),
        };
        truncated.header.truncated = true;

        loop {
            let bytes = truncated.encode_to_bytes()?;
            if bytes.len() <= max_len {
                return Ok(bytes);
            }
            if !truncated.additionals.is_empty() {
                truncated.additionals.pop();
                truncated.header.additionals_count -= 1;
            } else if !truncated.authorities.is_empty() {
                truncated.authorities.pop();
                truncated.header.authorities_count -= 1;
            } else if !truncated.answers.is_empty() {
                truncated.answers.pop();
                truncated.header.answers_count -= 1;
            } else {
                // Nothing left to drop; return the best-effort (still
                // oversized, but only the header/question/EDNS remain).
                return Ok(bytes);
            }
        }
    }
}

impl Message {
    pub fn id(&self) -> u16 {
        self.header.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::dns::class::Class;
    use crate::shared::dns::name::Name;
    use crate::shared::dns::types::RecordType;

    fn name(s: &str) -> Name {
        Name::from_string(s).unwrap()
    }

    fn sample_message() -> Message {
        Message {
            header: Header {
                id: 7,
                query_resp: true,
                op_code: crate::shared::dns::header::OpCode::STD,
                auth_answer: true,
                truncated: false,
                recursion_desired: true,
                recursion_available: false,
                z: 0,
                resp_code: crate::shared::dns::header::RespCode::NoError,
                questions_count: 1,
                answers_count: 1,
                authorities_count: 1,
                additionals_count: 0,
            },
            questions: vec![Question {
                node: name("example."),
                record_type: RecordType::A,
                class: Class::IN,
            }],
            answers: vec![Record::A {
                node: name("example."),
                class: Class::IN,
                ttl: 3600,
                data_len: 0,
                address: [192, 0, 2, 1],
            }],
            authorities: vec![Record::NS {
                node: name("example."),
                class: Class::IN,
                ttl: 3600,
                data_len: 0,
                name: name("ns1.example."),
            }],
            additionals: vec![],
            edns: None,
        }
    }

    #[test]
    fn message_round_trips_through_encode_and_decode() {
        let original = sample_message();
        let bytes = original.encode_to_bytes().unwrap();
        let decoded = Message::decode_from_bytes(&bytes).unwrap();

        assert_eq!(decoded.header.id, 7);
        assert_eq!(decoded.questions.len(), 1);
        assert_eq!(decoded.answers.len(), 1);
        assert_eq!(decoded.authorities.len(), 1);
        assert_eq!(decoded.answers[0].record_type(), RecordType::A);
    }

    #[test]
    fn oversized_response_is_truncated_with_tc_bit_set() {
        let mut msg = sample_message();
        for i in 0..2000 {
            msg.answers.push(Record::A {
                node: name(&format!("host{}.example.", i)),
                class: Class::IN,
                ttl: 3600,
                data_len: 0,
                address: [192, 0, 2, 1],
            });
        }
        msg.header.answers_count = msg.answers.len() as u16;

        let bytes = msg.encode_to_bytes_trunc(512).unwrap();
        assert!(bytes.len() <= 512 || bytes.len() < msg.encode_to_bytes().unwrap().len());
        let decoded = Message::decode_from_bytes(&bytes).unwrap();
        assert!(decoded.header.truncated);
    }
}
