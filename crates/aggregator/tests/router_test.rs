use registration_aggregator::ContentBasedRouter;
use registration_core::models::Subsystem;
use registration_testing_utils::RegistrationRequestBuilder;

#[test]
fn test_first_year_routes_to_housing_and_library() {
    let router = ContentBasedRouter::new();
    let request = RegistrationRequestBuilder::new()
        .with_student_id("S100")
        .with_year_level("1")
        .build();

    let plan = router.route(&request);

    assert!(plan.is_first_year);
    assert_eq!(
        plan.targets.iter().copied().collect::<Vec<_>>(),
        vec![Subsystem::Housing, Subsystem::Library]
    );
    assert_eq!(
        plan.subsystems_to_invoke(),
        vec![Subsystem::Academic, Subsystem::Housing, Subsystem::Library]
    );
}

#[test]
fn test_returning_student_routes_to_billing_and_library() {
    let router = ContentBasedRouter::new();
    let request = RegistrationRequestBuilder::new().returning().build();

    let plan = router.route(&request);

    assert!(!plan.is_first_year);
    assert!(plan.targets.contains(&Subsystem::Billing));
    assert!(plan.targets.contains(&Subsystem::Library));
    assert!(!plan.targets.contains(&Subsystem::Housing));
}

#[test]
fn test_missing_or_unknown_year_level_is_not_first_year() {
    let router = ContentBasedRouter::new();
    for request in [
        RegistrationRequestBuilder::new().without_year_level().build(),
        RegistrationRequestBuilder::new().with_year_level("graduate").build(),
    ] {
        let plan = router.route(&request);
        assert!(!plan.is_first_year);
        assert!(plan.targets.contains(&Subsystem::Billing));
    }
}

#[test]
fn test_every_plan_has_library_and_exactly_one_of_housing_or_billing() {
    let router = ContentBasedRouter::new();
    let levels = [
        Some("1"),
        Some("1st Year"),
        Some(" Freshman "),
        Some("first year"),
        Some("2"),
        Some("3"),
        Some("4"),
        Some("senior"),
        Some(""),
        None,
    ];

    for level in levels {
        let mut builder = RegistrationRequestBuilder::new().without_year_level();
        if let Some(level) = level {
            builder = builder.with_year_level(level);
        }
        let plan = router.route(&builder.build());

        assert!(plan.targets.contains(&Subsystem::Library));
        assert_eq!(plan.targets.len(), 2);
        assert_eq!(
            plan.targets.contains(&Subsystem::Housing),
            ContentBasedRouter::is_first_year(level)
        );
        assert_ne!(
            plan.targets.contains(&Subsystem::Housing),
            plan.targets.contains(&Subsystem::Billing)
        );
    }
}
