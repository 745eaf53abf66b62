diesel::table! {
    categories (category_id) {
        category_id -> BigInt,
        name -> Varchar,
    }
}

diesel::table! {
    events (id) {
        id -> BigInt,
        start_time -> Timestamptz,
        end_time -> Timestamptz,
        start_time_local -> Timestamp,
        end_time_local -> Timestamp,
        timezone -> Varchar,
        longitude -> Nullable<Double>,
        latitude -> Nullable<Double>,
        title -> Text,
        description_text -> Nullable<Text>,
        description_html -> Nullable<Text>,
        url -> Nullable<Text>,
        logo -> Nullable<Jsonb>,
        capacity -> Nullable<Integer>,
        is_free -> Bool,
        online_event -> Bool,
        category_id -> Nullable<BigInt>,
        attendees -> Jsonb,
    }
}

diesel::joinable!(events -> categories (category_id));

diesel::allow_tables_to_appear_in_same_query!(categories, events);
