use chrono::NaiveDate;
use proptest::prelude::*;
use tickvault_domain::repositories::providers::FetchWindow;
use tickvault_domain::value_objects::job::{JobKey, UpdateKind};
use tickvault_domain::value_objects::ticker::validate_ticker;

fn kind_strategy() -> impl Strategy<Value = UpdateKind> {
    prop_oneof![
        Just(UpdateKind::Full),
        Just(UpdateKind::Partial),
        Just(UpdateKind::Live),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn valid_tickers_decompose_back_out_of_job_keys(
        ticker in "\\^?[A-Z][A-Z.-]{0,7}",
        kind in kind_strategy(),
    ) {
        prop_assume!(validate_ticker(&ticker).is_ok());
        let key = JobKey::new(ticker.clone(), kind);
        let decoded = JobKey::decode(&key.encode()).unwrap();
        prop_assert_eq!(decoded.ticker, ticker);
        prop_assert_eq!(decoded.kind, kind);
    }

    #[test]
    fn window_accepts_exactly_ordered_ranges(a in 0i64..20_000, b in 0i64..20_000) {
        let base = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap();
        let start = base + chrono::Duration::days(a);
        let end = base + chrono::Duration::days(b);
        prop_assert_eq!(FetchWindow::new(start, end).is_ok(), a <= b);
    }
}
