//! Adapts the four-packet fixture used to exercise `MessageIndex` query
//! behaviour against a live `Message::from_packet` pipeline rather than
//! hand-built rows, covering spec scenario 6.

use chrono::{TimeZone, Utc};
use ramses_protocol::header::{Code, PartyId, Verb};
use ramses_protocol::{Message, MessageIndex, Packet};
use serde_json::json;

fn id(raw: &str) -> PartyId {
    PartyId::parse(raw).unwrap()
}

fn at(offset_secs: i64) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(offset_secs)
}

#[test]
fn query_fixture_matches_four_packet_scenario() {
    let index = MessageIndex::new();

    let src1 = id("32:166025");
    let src2 = id("01:087939");

    // pkt1: a CO2 sensor announcing with no reading yet.
    let pkt1 = Packet::new(Code(0x1298), Verb::I, src1.clone(), src1.clone(), None, at(0), "007FFF");
    let msg1 = Message::from_packet(&pkt1, json!({ "co2_level": null }));
    assert_eq!(index.add(msg1.clone()), None);

    // pkt2: the same sensor, same header, now with a real reading —
    // supersedes pkt1's row in place.
    let pkt2 = Packet::new(Code(0x1298), Verb::I, src1.clone(), src1.clone(), None, at(10), "001230");
    let msg2 = Message::from_packet(&pkt2, json!({ "co2_level": 512 }));
    let replaced = index.add(msg2.clone());
    assert_eq!(replaced, Some(msg1));
    assert_eq!(index.all().len(), 1);

    // pkt3: a controller's zone setpoints, distinct header.
    let pkt3 = Packet::new(Code(0x2309), Verb::I, src2.clone(), src2.clone(), None, at(20), "00");
    let msg3 = Message::from_packet(&pkt3, json!({ "zone_idx": "00", "setpoint": 21.0 }));
    assert_eq!(index.add(msg3), None);

    // pkt4: the sensor's HVAC status block, keyed with a zone/domain ctx.
    let pkt4 = Packet::new(Code(0x31DA), Verb::I, src1.clone(), src1.clone(), Some("00".into()), at(30), "00");
    let msg4 = Message::from_packet(&pkt4, json!({ "co2_level": 498, "indoor_humidity": 45 }));
    assert_eq!(index.add(msg4), None);

    assert_eq!(index.all().len(), 3);

    assert!(index.contains(Some(Code(0x2309)), None, None, None, None, None));
    assert!(index.contains(Some(Code(0x2309)), None, Some(&src2), None, None, None));
    assert!(!index.contains(Some(Code(0x2309)), None, Some(&id("01:112233")), None, None, None));
    assert!(!index.contains(Some(Code(0x1234)), None, None, None, None, None));
    assert!(index.contains(None, None, None, Some(&src2), None, None));

    let err = index.qry_field("RANDOM from messages", rusqlite::params![src1.as_str(), src1.as_str()]);
    assert!(err.is_err());

    let rows = index
        .qry_field(
            "SELECT code, plk FROM messages WHERE (src = ?1 OR dst = ?1)",
            rusqlite::params![src2.as_str()],
        )
        .expect("select succeeds");
    assert_eq!(
        rows,
        vec![vec![
            rusqlite::types::Value::Text("2309".to_owned()),
            rusqlite::types::Value::Text("|zone_idx|setpoint|".to_owned()),
        ]]
    );

    let rows = index
        .qry_field(
            "SELECT code, plk FROM messages WHERE verb IN ('I', 'RP')
             AND (src = ?1 OR dst = ?1)
             AND code IN ('1298', '31DA')
             AND plk LIKE '%co2_level%'",
            rusqlite::params![src1.as_str()],
        )
        .expect("select succeeds");
    assert_eq!(
        rows,
        vec![
            vec![
                rusqlite::types::Value::Text("1298".to_owned()),
                rusqlite::types::Value::Text("|co2_level|".to_owned()),
            ],
            vec![
                rusqlite::types::Value::Text("31DA".to_owned()),
                rusqlite::types::Value::Text("|co2_level|indoor_humidity|".to_owned()),
            ],
        ]
    );
    assert!(index.contains(None, None, None, None, None, Some("co2_level")));

    // Unlike the sentinel-string `ctx` column this is adapted from, a
    // message with no ctx reports SQL NULL here, not the literal "False".
    let rows = index
        .qry_field(
            "SELECT code, ctx FROM messages WHERE verb IN ('I', 'RP')
             AND (src = ?1 OR dst = ?1)
             AND plk LIKE '%co2_level%'",
            rusqlite::params![src1.as_str()],
        )
        .expect("select succeeds");
    assert_eq!(
        rows,
        vec![
            vec![rusqlite::types::Value::Text("1298".to_owned()), rusqlite::types::Value::Null],
            vec![
                rusqlite::types::Value::Text("31DA".to_owned()),
                rusqlite::types::Value::Text("00".to_owned()),
            ],
        ]
    );
}
