use crate::nameserver::zones::*;
use crate::shared::buffer::BitsBuffer;
use crate::shared::dns::Question;
use crate::shared::net::*;
use crate::shared::{dns, log};
use std::collections::HashSet;

/// The nameserver handler able to serve dns requests via its [`DnsHandler`]
/// implementation. Wraps the [`ViewRegistry`] built at startup; all of its
/// state is immutable once the server is serving, so sharing it across
/// worker threads needs no synchronization.
pub struct NameserverHandler(pub ViewRegistry);

impl DnsHandler for NameserverHandler {
    fn handle_request<R: DnsRead, W: DnsWrite>(&self, req: R, resp: W) {
        handle_dns_request(req, resp, &self.0);
    }
}

fn handle_dns_request<R: DnsRead, W: DnsWrite>(req: R, resp: W, registry: &ViewRegistry) {
    let dns_request = match req.read() {
        DnsReadResult::FullMessage(req) => req,
        DnsReadResult::HeaderOnly(hdr, err) => {
            log::debug!("[{}] Decoding request failed: {:?}.", hdr.id, err);
            return;
        }
        DnsReadResult::ParseErr(msg_err, hdr_err) => {
            log::debug!("Decoding request: {:?}, decoding header: {:?}", msg_err, hdr_err);
            return;
        }
        DnsReadResult::IoErr(err) => {
            log::warn!("IO error: {:?}", err);
            return;
        }
    };

    let question = match validate_dns_request(&dns_request) {
        Ok(question) => question,
        Err(err) => {
            log::debug!("[{}] Dropping malformed request: {}.", dns_request.id(), err);
            return;
        }
    };

    log::info!(
        "[{}] Start handling request: node '{}', class {:?}, type {:?}.",
        dns_request.id(),
        question.node,
        question.class,
        question.record_type
    );
    log::debug!("[{}] Complete request: {:?}", dns_request.id(), dns_request);

    dispatch(dns_request, resp, registry);
}

// Validate minimal sanity of a client request: exactly one question, QR bit
// clear, OPCODE = QUERY. Anything else is dropped to avoid amplification of
// spoofed sources.
fn validate_dns_request(dns_req: &dns::Message) -> Result<&Question, String> {
    if !dns_req.header.is_request() {
        return Err("QR bit set in query".to_string());
    }
    if !matches!(dns_req.header.op_code, dns::OpCode::STD) {
        return Err(format!("unsupported opcode: {:?}", dns_req.header.op_code));
    }
    if dns_req.header.answers_count != 0 {
        return Err(format!("invalid # of answers: {:?}", dns_req.header.answers_count));
    }
    if dns_req.header.authorities_count != 0 {
        return Err(format!(
            "invalid # of authorities: {:?}",
            dns_req.header.authorities_count
        ));
    }
    match dns_req.questions.as_slice() {
        [question] => Ok(question),
        _ => Err(format!("invalid # of questions: {:?}", dns_req.header.questions_count)),
    }
}

/// Dispatch a validated request: extract the view/zone selection hints from
/// EDNS options, resolve the target view and zone, then invoke the
/// responder to build and send the answer.
fn dispatch<W: DnsWrite>(request: dns::Message, resp: W, registry: &ViewRegistry) {
    let question = request.questions[0].clone();
    let (target_zone, target_view) = extract_option_hints(&request);

    let view = match &target_view {
        Some(name) => registry.get_exact(name).unwrap_or_else(|| {
            log::info!("[{}] Unknown view '{}', falling back to root view.", request.id(), name);
            registry.default()
        }),
        None => registry.default(),
    };

    let exact_zone = target_zone.as_ref().and_then(|name| view.get(name));
    let zone = match exact_zone {
        Some(zone) => zone,
        None => {
            if let Some(name) = &target_zone {
                log::info!(
                    "[{}] No exact zone '{}' in selected view, falling back to suffix match.",
                    request.id(),
                    name
                );
            }
            match view.deepest_match(&question.node) {
                Some(zone) => zone,
                None => {
                    handle_err(resp, &request, dns::RespCode::Refused);
                    return;
                }
            }
        }
    };

    answer(resp, request, zone);
}

// Walk the EDNS options (if any), pulling out the view/zone selection
// hints. Other option codes are logged and ignored. A malformed name
// payload is logged and treated as if the option were absent.
fn extract_option_hints(request: &dns::Message) -> (Option<dns::Name>, Option<dns::Name>) {
    let mut target_zone = None;
    let mut target_view = None;

    let edns = match &request.edns {
        Some(edns) => edns,
        None => return (None, None),
    };

    for option in &edns.options {
        match option.code {
            dns::OPT_TARGET_ZONE => match decode_option_name(&option.data) {
                Ok(name) => target_zone = Some(name),
                Err(err) => log::warn!("[{}] Malformed TARGET_ZONE option: {:?}", request.id(), err),
            },
            dns::OPT_TARGET_VIEW => match decode_option_name(&option.data) {
                Ok(name) => target_view = Some(name),
                Err(err) => log::warn!("[{}] Malformed TARGET_VIEW option: {:?}", request.id(), err),
            },
            other => log::debug!("[{}] Ignoring unknown EDNS option {}.", request.id(), other),
        }
    }

    (target_zone, target_view)
}

fn decode_option_name(data: &[u8]) -> Result<dns::Name, dns::NameErr> {
    let mut buffer = BitsBuffer::from_raw_bytes(data);
    dns::Name::from_bytes(&mut buffer)
}

/// The responder. Builds and sends the reply for `request` against the
/// resolved `zone`, implementing out-of-bailiwick, delegation, exact-match,
/// CNAME fallback, ANY and NODATA/NXDOMAIN.
fn answer<W: DnsWrite>(resp: W, request: dns::Message, zone: &Zone) {
    let dns::Question { node, record_type, class } = request.questions[0].clone();

    if !matches!(class, dns::Class::IN) {
        handle_err(resp, &request, dns::RespCode::Refused);
        return;
    }
    if !node.is_in_zone(&zone.origin) {
        handle_err(resp, &request, dns::RespCode::Refused);
        return;
    }

    if let Some((ns_owner, ns_records)) = find_delegation(&node, zone) {
        reply_referral(resp, request, ns_owner, ns_records, zone);
        return;
    }

    if record_type == dns::RecordType::WC {
        if let Some(node_records) = zone.get_node(&node) {
            let answers: Vec<dns::Record> = node_records.values().flatten().cloned().collect();
            if !answers.is_empty() {
                reply_answer(resp, request, answers, zone);
                return;
            }
        }
    } else if let Some(records) = zone.get(&node, record_type) {
        reply_answer(resp, request, records.clone(), zone);
        return;
    } else if let Some(cname) = zone.get(&node, dns::RecordType::CNAME) {
        reply_answer(resp, request, cname.clone(), zone);
        return;
    }

    reply_nodata_or_nxdomain(resp, request, &node, zone);
}

// Walk strict ancestors of `node`, stopping before `zone.origin` (apex NS is
// not a delegation), bottom-up (longest names first). Returns the first
// ancestor carrying an NS RRset, if any.
fn find_delegation<'a>(node: &dns::Name, zone: &'a Zone) -> Option<(dns::Name, &'a Vec<dns::Record>)> {
    let mut current = node.clone();
    loop {
        if current == zone.origin {
            return None;
        }
        if let Some(ns_records) = zone.get(&current, dns::RecordType::NS) {
            return Some((current, ns_records));
        }
        current = current.parent()?;
    }
}

fn reply_referral<W: DnsWrite>(resp: W, request: dns::Message, _ns_owner: dns::Name, ns_records: &Vec<dns::Record>, zone: &Zone) {
    let authorities = ns_records.clone();
    let additionals = glue_for(&authorities, zone);
    let edns = response_edns(&request);

    let mut resp_header = resp_header_from_req_header(&request.header, dns::RespCode::NoError);
    resp_header.auth_answer = false;
    resp_header.questions_count = 1;
    resp_header.answers_count = 0;
    resp_header.authorities_count = authorities.len() as u16;
    resp_header.additionals_count = additionals.len() as u16 + edns.is_some() as u16;
    let response = dns::Message {
        header: resp_header,
        questions: request.questions,
        answers: vec![],
        authorities,
        additionals,
        edns,
    };

    reply(resp, response);
}

fn reply_answer<W: DnsWrite>(resp: W, request: dns::Message, answers: Vec<dns::Record>, zone: &Zone) {
    let authorities: Vec<dns::Record> = zone
        .get(&zone.origin, dns::RecordType::NS)
        .cloned()
        .unwrap_or_default();

    let mut glue_source = answers.clone();
    glue_source.extend(authorities.clone());
    let additionals = glue_for(&glue_source, zone);
    let edns = response_edns(&request);

    let mut resp_header = resp_header_from_req_header(&request.header, dns::RespCode::NoError);
    resp_header.auth_answer = true;
    resp_header.questions_count = 1;
    resp_header.answers_count = answers.len() as u16;
    resp_header.authorities_count = authorities.len() as u16;
    resp_header.additionals_count = additionals.len() as u16 + edns.is_some() as u16;
    let response = dns::Message {
        header: resp_header,
        questions: request.questions,
        answers,
        authorities,
        additionals,
        edns,
    };

    reply(resp, response);
}

fn reply_nodata_or_nxdomain<W: DnsWrite>(resp: W, request: dns::Message, node: &dns::Name, zone: &Zone) {
    let soa_records = match zone.get(&zone.origin, dns::RecordType::SOA) {
        Some(v) => v,
        None => {
            log::error!("[{}] Zone '{}' missing apex SOA.", request.id(), zone.origin);
            handle_err(resp, &request, dns::RespCode::ServFail);
            return;
        }
    };
    let soa_record = soa_records.first().expect("non-empty RRset invariant").clone();

    let resp_code = if zone.contains_name(node) {
        dns::RespCode::NoError
    } else {
        dns::RespCode::NxDomain
    };
    let edns = response_edns(&request);

    let mut resp_header = resp_header_from_req_header(&request.header, resp_code);
    resp_header.auth_answer = true;
    resp_header.questions_count = 1;
    resp_header.answers_count = 0;
    resp_header.authorities_count = 1;
    resp_header.additionals_count = edns.is_some() as u16;
    let response = dns::Message {
        header: resp_header,
        questions: request.questions,
        answers: vec![],
        authorities: vec![soa_record],
        additionals: vec![],
        edns,
    };

    reply(resp, response);
}

// The OPT pseudo-record to attach to a built response, advertising this
// server's UDP payload size (RFC 6891 §6.1.1), present iff the query
// itself carried an OPT record.
fn response_edns(request: &dns::Message) -> Option<dns::Edns> {
    request.edns.as_ref().map(|_| dns::Edns::new(dns::EDNS_ADVERTISED_PAYLOAD_SIZE))
}

// Additional-section glue: for every NS (target) or MX (exchange) RRset
// among `records`, look up A/AAAA RRsets for the target name within `zone`
// only. Duplicate (name,type) additions are merged.
fn glue_for(records: &[dns::Record], zone: &Zone) -> Vec<dns::Record> {
    let mut seen: HashSet<(dns::Name, dns::RecordType)> = HashSet::new();
    let mut additionals = vec![];

    for record in records {
        let target = match record.record_type() {
            dns::RecordType::NS => record.ns_data(),
            dns::RecordType::MX => record.mx_name(),
            _ => continue,
        };

        for kind in [dns::RecordType::A, dns::RecordType::AAAA] {
            if !seen.insert((target.clone(), kind)) {
                continue;
            }
            if let Some(glue) = zone.get(target, kind) {
                additionals.extend(glue.iter().cloned());
            }
        }
    }

    additionals
}

/// Generic error handler used to reply to a client with a specific rcode.
/// Questions are included; REFUSED and SERVFAIL are never direct answers,
/// so AA is always clear.
fn handle_err<W: DnsWrite>(resp: W, dns_req: &dns::Message, resp_code: dns::RespCode) {
    let edns = response_edns(dns_req);

    let mut resp_header = resp_header_from_req_header(&dns_req.header, resp_code);
    resp_header.auth_answer = false;
    resp_header.answers_count = 0;
    resp_header.authorities_count = 0;
    resp_header.additionals_count = edns.is_some() as u16;
    let dns_resp = dns::Message {
        header: resp_header,
        questions: dns_req.questions.clone(),
        answers: vec![],
        authorities: vec![],
        additionals: vec![],
        edns,
    };

    reply(resp, dns_resp);
}

/// Reply to the client and log the outcome.
fn reply<W: DnsWrite>(resp: W, dns_response: dns::Message) {
    let response_id = dns_response.id();
    let response_code = dns_response.header.resp_code;
    log::debug!("[{}] Complete response: {:?}", response_id, dns_response);
    match resp.reply(dns_response) {
        Ok(_) => log::info!("[{}] Request served [{:?}].", response_id, response_code),
        Err(err) => log::error!("[{}] Error replying: {}", response_id, err),
    };
}

// Creates a proper header from the request header, suitable to be used in
// the corresponding response. The passed code is used in the resp header.
fn resp_header_from_req_header(req_header: &dns::Header, resp_code: dns::RespCode) -> dns::Header {
    dns::Header {
        query_resp: true,
        auth_answer: false,
        recursion_available: false,
        z: 0,
        resp_code,
        ..req_header.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::buffer::BitsBuffer as Buffer;
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[derive(Clone, Default)]
    struct CapturingWriter(Arc<Mutex<Option<dns::Message>>>);

    impl DnsWrite for CapturingWriter {
        fn reply(self, response: dns::Message) -> std::io::Result<()> {
            *self.0.lock().unwrap() = Some(response);
            Ok(())
        }
    }

    fn name(s: &str) -> dns::Name {
        dns::Name::from_string(s).unwrap()
    }

    fn request(node: &str, record_type: dns::RecordType) -> dns::Message {
        dns::Message {
            header: dns::Header {
                id: 42,
                query_resp: false,
                op_code: dns::OpCode::STD,
                auth_answer: false,
                truncated: false,
                recursion_desired: true,
                recursion_available: false,
                z: 0,
                resp_code: dns::RespCode::NoError,
                questions_count: 1,
                answers_count: 0,
                authorities_count: 0,
                additionals_count: 0,
            },
            questions: vec![dns::Question {
                node: name(node),
                record_type,
                class: dns::Class::IN,
            }],
            answers: vec![],
            authorities: vec![],
            additionals: vec![],
            edns: None,
        }
    }

    fn request_with_option(node: &str, record_type: dns::RecordType, code: u16, hint: &str) -> dns::Message {
        let mut msg = request(node, record_type);
        let mut buf = Buffer::new();
        buf.write_bytes(&name(hint).to_bytes());
        msg.edns = Some(dns::Edns::new(4096).with_option(code, buf.into_vec()));
        msg
    }

    // Builds a single zone rooted at `example.` with:
    // - apex SOA/NS (ns1/ns2.example., both with A glue)
    // - www.example. A + AAAA
    // - cname.example. CNAME -> www.example.
    // - mail.example. MX -> mx.example. (with A glue) + mx.example. A
    // - sub.example. NS -> ns.sub.example. (delegation, with glue)
    // - leaf.a.b.example. TXT (makes a.b.example./b.example. empty non-terminals)
    fn build_zone() -> Zone {
        let origin = name("example.");
        let mut zone = Zone::new(&origin);

        zone.insert(dns::Record::SOA {
            node: origin.clone(),
            class: dns::Class::IN,
            ttl: 3600,
            data_len: 0,
            ns_name: name("ns1.example."),
            ml_name: name("hostmaster.example."),
            serial: 1,
            refresh: 3600,
            retry: 600,
            expire: 86400,
            minimum: 60,
        });
        zone.insert(dns::Record::NS {
            node: origin.clone(),
            class: dns::Class::IN,
            ttl: 3600,
            data_len: 0,
            name: name("ns1.example."),
        });
        zone.insert(dns::Record::NS {
            node: origin.clone(),
            class: dns::Class::IN,
            ttl: 3600,
            data_len: 0,
            name: name("ns2.example."),
        });
        zone.insert(dns::Record::A {
            node: name("ns1.example."),
            class: dns::Class::IN,
            ttl: 3600,
            data_len: 0,
            address: [10, 0, 0, 1],
        });
        zone.insert(dns::Record::A {
            node: name("ns2.example."),
            class: dns::Class::IN,
            ttl: 3600,
            data_len: 0,
            address: [10, 0, 0, 2],
        });
        zone.insert(dns::Record::A {
            node: name("www.example."),
            class: dns::Class::IN,
            ttl: 3600,
            data_len: 0,
            address: [192, 0, 2, 1],
        });
        zone.insert(dns::Record::AAAA {
            node: name("www.example."),
            class: dns::Class::IN,
            ttl: 3600,
            data_len: 0,
            address: [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1],
        });
        zone.insert(dns::Record::CNAME {
            node: name("cname.example."),
            class: dns::Class::IN,
            ttl: 3600,
            data_len: 0,
            name: name("www.example."),
        });
        zone.insert(dns::Record::MX {
            node: name("mail.example."),
            class: dns::Class::IN,
            ttl: 3600,
            data_len: 0,
            priority: 10,
            name: name("mx.example."),
        });
        zone.insert(dns::Record::A {
            node: name("mx.example."),
            class: dns::Class::IN,
            ttl: 3600,
            data_len: 0,
            address: [192, 0, 2, 2],
        });
        zone.insert(dns::Record::NS {
            node: name("sub.example."),
            class: dns::Class::IN,
            ttl: 3600,
            data_len: 0,
            name: name("ns.sub.example."),
        });
        zone.insert(dns::Record::A {
            node: name("ns.sub.example."),
            class: dns::Class::IN,
            ttl: 3600,
            data_len: 0,
            address: [10, 0, 0, 3],
        });
        zone.insert(dns::Record::TXT {
            node: name("leaf.a.b.example."),
            class: dns::Class::IN,
            ttl: 3600,
            data_len: 0,
            txts: vec!["hello".to_string()],
        });

        zone.compute_all_names();
        zone
    }

    fn answer_for(req: dns::Message, zone: &Zone) -> dns::Message {
        let writer = CapturingWriter::default();
        answer(writer.clone(), req, zone);
        writer.0.lock().unwrap().take().expect("answer() always replies")
    }

    #[test]
    fn exact_match_is_answered_authoritatively_with_ns_authority_and_glue() {
        let zone = build_zone();
        let response = answer_for(request("www.example.", dns::RecordType::A), &zone);

        assert!(matches!(response.header.resp_code, dns::RespCode::NoError));
        assert!(response.header.auth_answer);
        assert_eq!(response.answers.len(), 1);
        assert_eq!(response.answers[0].record_type(), dns::RecordType::A);
        assert_eq!(response.authorities.len(), 2); // apex NS RRset
        assert!(response.additionals.iter().any(|r| r.node() == &name("ns1.example.")));
        assert!(response.additionals.iter().any(|r| r.node() == &name("ns2.example.")));
    }

    #[test]
    fn cname_falls_back_when_no_record_of_the_requested_type_exists() {
        let zone = build_zone();
        let response = answer_for(request("cname.example.", dns::RecordType::AAAA), &zone);

        assert!(matches!(response.header.resp_code, dns::RespCode::NoError));
        assert_eq!(response.answers.len(), 1);
        assert_eq!(response.answers[0].record_type(), dns::RecordType::CNAME);
    }

    #[test]
    fn any_query_returns_every_rrset_at_the_node() {
        let zone = build_zone();
        let response = answer_for(request("www.example.", dns::RecordType::WC), &zone);

        assert!(matches!(response.header.resp_code, dns::RespCode::NoError));
        assert_eq!(response.answers.len(), 2); // A + AAAA
    }

    #[test]
    fn nodata_at_an_empty_non_terminal_returns_noerror_with_soa_authority() {
        let zone = build_zone();
        let response = answer_for(request("a.b.example.", dns::RecordType::A), &zone);

        assert!(matches!(response.header.resp_code, dns::RespCode::NoError));
        assert!(response.answers.is_empty());
        assert_eq!(response.authorities.len(), 1);
        assert_eq!(response.authorities[0].record_type(), dns::RecordType::SOA);
    }

    #[test]
    fn missing_name_returns_nxdomain_with_soa_authority() {
        let zone = build_zone();
        let response = answer_for(request("nope.example.", dns::RecordType::A), &zone);

        assert!(matches!(response.header.resp_code, dns::RespCode::NxDomain));
        assert!(response.answers.is_empty());
        assert_eq!(response.authorities.len(), 1);
        assert_eq!(response.authorities[0].record_type(), dns::RecordType::SOA);
    }

    #[test]
    fn delegation_below_apex_returns_a_referral_with_glue() {
        let zone = build_zone();
        let response = answer_for(request("host.sub.example.", dns::RecordType::A), &zone);

        assert!(matches!(response.header.resp_code, dns::RespCode::NoError));
        assert!(!response.header.auth_answer);
        assert!(response.answers.is_empty());
        assert_eq!(response.authorities.len(), 1);
        assert_eq!(response.authorities[0].record_type(), dns::RecordType::NS);
        assert!(response.additionals.iter().any(|r| r.node() == &name("ns.sub.example.")));
    }

    #[test]
    fn out_of_bailiwick_query_is_refused() {
        let zone = build_zone();
        let response = answer_for(request("other.test.", dns::RecordType::A), &zone);

        assert!(matches!(response.header.resp_code, dns::RespCode::Refused));
        assert!(!response.header.auth_answer);
    }

    #[test]
    fn edns_query_gets_an_edns_response_advertising_the_payload_size() {
        let zone = build_zone();
        let req = request_with_option("www.example.", dns::RecordType::A, dns::OPT_TARGET_VIEW, ".");
        let response = answer_for(req, &zone);

        let edns = response.edns.as_ref().expect("response should carry an OPT record");
        assert_eq!(edns.udp_payload_size, dns::EDNS_ADVERTISED_PAYLOAD_SIZE);
        assert_eq!(
            response.header.additionals_count as usize,
            response.additionals.len() + 1
        );
    }

    #[test]
    fn non_edns_query_gets_a_response_without_edns() {
        let zone = build_zone();
        let response = answer_for(request("www.example.", dns::RecordType::A), &zone);

        assert!(response.edns.is_none());
        assert_eq!(response.header.additionals_count as usize, response.additionals.len());
    }

    #[test]
    fn response_header_echoes_id_and_clears_recursion_desired() {
        let zone = build_zone();
        let response = answer_for(request("www.example.", dns::RecordType::A), &zone);

        assert_eq!(response.header.id, 42);
        assert!(response.header.query_resp);
        assert!(!response.header.recursion_available);
        assert_eq!(response.questions.len(), 1);
        assert_eq!(response.questions[0].node, name("www.example."));
    }

    fn registry_with_two_zones_and_a_named_view() -> ViewRegistry {
        let mut default_view = View::new();
        default_view.insert(build_zone());

        let mut internal_zone = build_zone();
        // Give the named view's copy of the zone a distinguishing A record so
        // tests can tell which view actually answered.
        internal_zone.insert(dns::Record::A {
            node: name("internal-only.example."),
            class: dns::Class::IN,
            ttl: 3600,
            data_len: 0,
            address: [198, 51, 100, 1],
        });
        internal_zone.compute_all_names();
        let mut internal_view = View::new();
        internal_view.insert(internal_zone);

        let mut registry = ViewRegistry::new(default_view);
        registry.insert(name("internal."), internal_view);
        registry
    }

    fn dispatch_for(req: dns::Message, registry: &ViewRegistry) -> dns::Message {
        let writer = CapturingWriter::default();
        dispatch(req, writer.clone(), registry);
        writer.0.lock().unwrap().take().expect("dispatch() always replies")
    }

    #[test]
    fn target_view_option_selects_the_named_view() {
        let registry = registry_with_two_zones_and_a_named_view();
        let req = request_with_option("internal-only.example.", dns::RecordType::A, dns::OPT_TARGET_VIEW, "internal.");
        let response = dispatch_for(req, &registry);

        assert!(matches!(response.header.resp_code, dns::RespCode::NoError));
        assert_eq!(response.answers.len(), 1);
    }

    #[test]
    fn unknown_target_view_falls_back_to_the_default_view() {
        let registry = registry_with_two_zones_and_a_named_view();
        let req = request_with_option("www.example.", dns::RecordType::A, dns::OPT_TARGET_VIEW, "no-such-view.");
        let response = dispatch_for(req, &registry);

        assert!(matches!(response.header.resp_code, dns::RespCode::NoError));
        assert_eq!(response.answers.len(), 1);
    }

    #[test]
    fn target_zone_option_without_an_exact_match_falls_back_to_deepest_suffix() {
        let mut default_view = View::new();
        default_view.insert(build_zone());
        let registry = ViewRegistry::new(default_view);

        let req = request_with_option("www.example.", dns::RecordType::A, dns::OPT_TARGET_ZONE, "no-such-zone.");
        let response = dispatch_for(req, &registry);

        assert!(matches!(response.header.resp_code, dns::RespCode::NoError));
        assert_eq!(response.answers.len(), 1);
    }

    #[test]
    fn no_matching_zone_in_the_selected_view_is_refused() {
        let registry = ViewRegistry::new(View::new());
        let response = dispatch_for(request("www.example.", dns::RecordType::A), &registry);

        assert!(matches!(response.header.resp_code, dns::RespCode::Refused));
        assert!(!response.header.auth_answer);
    }

    #[test]
    fn concurrent_dispatch_against_a_shared_registry_is_consistent() {
        let mut default_view = View::new();
        default_view.insert(build_zone());
        let registry = Arc::new(ViewRegistry::new(default_view));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let writer = CapturingWriter::default();
                    dispatch(request("www.example.", dns::RecordType::A), writer.clone(), &registry);
                    let response = writer.0.lock().unwrap().take().unwrap();
                    matches!(response.header.resp_code, dns::RespCode::NoError) && response.answers.len() == 1
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
