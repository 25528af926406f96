use rstest::rstest;
use scanrep_hardware::util::{LineFramer, MAX_LINE_BYTES};

#[test]
fn lines_split_across_chunks_are_reassembled() {
    let mut framer = LineFramer::new();
    framer.push(b"1200,0.4");
    assert_eq!(framer.next_line(), None);
    framer.push(b"51,kgs,\r\n1250,0.");
    assert_eq!(framer.next_line().as_deref(), Some("1200,0.451,kgs,"));
    assert_eq!(framer.next_line(), None);
    framer.push(b"460,kgs,\n");
    assert_eq!(framer.next_line().as_deref(), Some("1250,0.460,kgs,"));
    assert_eq!(framer.pending_len(), 0);
}

#[rstest]
#[case(b"\n" as &[u8], "")]
#[case(b"\r\n", "")]
#[case(b"a,b,c,\n", "a,b,c,")]
fn edge_lines(#[case] input: &[u8], #[case] expected: &str) {
    let mut framer = LineFramer::new();
    framer.push(input);
    assert_eq!(framer.next_line().as_deref(), Some(expected));
}

#[test]
fn runaway_data_without_newline_is_dropped() {
    let mut framer = LineFramer::new();
    framer.push(&vec![b'x'; MAX_LINE_BYTES + 1]);
    assert_eq!(framer.pending_len(), 0);
    framer.push(b"1,2.0,kgs,\n");
    assert_eq!(framer.next_line().as_deref(), Some("1,2.0,kgs,"));
}

#[test]
fn clear_discards_partial_line() {
    let mut framer = LineFramer::new();
    framer.push(b"stale,1.0");
    framer.clear();
    framer.push(b"9,3.0,kgs,\n");
    assert_eq!(framer.next_line().as_deref(), Some("9,3.0,kgs,"));
}
