use super::*;

#[test]
fn example() {
    const LYRIC: &str = "[00:12.00]Line 1 lyrics\n[00:17.20]Line 2 lyrics";

    let track = parse_synced(LYRIC);

    assert_eq!(
        track,
        LyricTrack::new(vec![
            LyricLine {
                at: Duration::from_secs(12),
                text: "Line 1 lyrics".to_owned(),
            },
            LyricLine {
                at: Duration::from_secs(17) + Duration::from_millis(200),
                text: "Line 2 lyrics".to_owned(),
            },
        ])
    );
}

#[test]
fn repeating_lyrics() {
    const LYRIC: &str = "[00:12.00]Line 1 lyrics\n[00:21.10][00:45.10]Repeating lyrics (e.g. chorus)";

    let track = parse_synced(LYRIC);

    assert_eq!(
        track.line(1).unwrap().at,
        Duration::from_secs(21) + Duration::from_millis(100)
    );
    assert_eq!(
        track.line(2).unwrap().at,
        Duration::from_secs(45) + Duration::from_millis(100)
    );
    assert_eq!(track.line(2).unwrap().text, "Repeating lyrics (e.g. chorus)");
    assert!(track.line(3).is_none());
}

#[test]
fn untagged_lines_are_skipped() {
    const LYRIC: &str = "[ar: Jefferson Airplane]\nplain header\n[00:06.47]And all the joy";

    let track = parse_synced(LYRIC);

    assert_eq!(track.line(0).unwrap().text, "And all the joy");
    assert!(track.line(1).is_none());
}

#[test]
fn out_of_order_input_is_sorted() {
    const LYRIC: &str = "[00:30.00]later\n[00:10.00]earlier";

    let track = parse_synced(LYRIC);

    assert_eq!(track.line(0).unwrap().text, "earlier");
    assert_eq!(track.line(1).unwrap().text, "later");
}

#[test]
fn index_lookup_boundaries() {
    let track = parse_synced("[00:10.00]a\n[00:20.00]b\n[00:30.00]c");

    assert_eq!(track.index_at(Duration::from_secs(9)), None);
    assert_eq!(track.index_at(Duration::from_secs(10)), Some(0));
    assert_eq!(track.index_at(Duration::from_secs(19)), Some(0));
    assert_eq!(track.index_at(Duration::from_secs(20)), Some(1));
    assert_eq!(track.index_at(Duration::from_secs(500)), Some(2));
}

#[test]
fn display_durations() {
    let track = parse_synced("[00:10.00]a\n[00:12.50]b");

    assert_eq!(
        track.display_duration(0),
        Duration::from_millis(2500)
    );
    // The final line falls back to the fixed hold time.
    assert_eq!(track.display_duration(1), LAST_LINE_HOLD);
}

#[test]
fn track_key_requires_title() {
    use crate::metadata::TrackMetadata;

    let mut metadata = TrackMetadata::default();
    assert_eq!(TrackKey::of(&metadata), None);

    metadata.title = Some("Song".to_owned());
    metadata.artists = vec!["A".to_owned(), "B".to_owned()];
    let key = TrackKey::of(&metadata).unwrap();
    assert_eq!(key.title(), "Song");
    assert_eq!(key.artist(), "A, B");
}

#[test]
fn malformed_timestamps_do_not_panic() {
    let track = parse_synced("[xx:yy.zz]nope\n[00:05.00]fine\n[-1:00.00]negative");
    assert_eq!(track.line(0).unwrap().text, "fine");
    assert!(track.line(1).is_none());
}
