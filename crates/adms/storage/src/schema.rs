//! Diesel schema definitions.

diesel::table! {
    devices (id) {
        id -> BigInt,
        serial_number -> Text,
        tenant_id -> BigInt,
        name -> Text,
        model -> Nullable<Text>,
        status -> Text,
        tz_offset_minutes -> Integer,
        last_sync_at -> Nullable<Timestamp>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    persons (kind, id) {
        kind -> Text,
        id -> BigInt,
        tenant_id -> BigInt,
        name -> Text,
        status -> Text,
    }
}

diesel::table! {
    enrollments (id) {
        id -> BigInt,
        device_id -> BigInt,
        device_user_id -> Text,
        person_kind -> Text,
        person_id -> BigInt,
        status -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    punch_logs (id) {
        id -> BigInt,
        device_id -> BigInt,
        device_user_id -> Text,
        punch_time -> Timestamp,
        punch_type -> Text,
        verify_method -> Integer,
        processed -> Bool,
        error -> Nullable<Text>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    attendance_sessions (id) {
        id -> BigInt,
        tenant_id -> BigInt,
        person_kind -> Text,
        person_id -> BigInt,
        checkin_time -> Timestamp,
        checkout_time -> Nullable<Timestamp>,
        checkout_method -> Nullable<Text>,
        status -> Text,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    device_commands (id) {
        id -> BigInt,
        uuid -> Text,
        device_id -> BigInt,
        command_type -> Text,
        payload -> Text,
        status -> Text,
        created_at -> Timestamp,
        sent_at -> Nullable<Timestamp>,
        executed_at -> Nullable<Timestamp>,
        return_value -> Nullable<Text>,
    }
}

diesel::joinable!(enrollments -> devices (device_id));
diesel::joinable!(punch_logs -> devices (device_id));
diesel::joinable!(device_commands -> devices (device_id));

diesel::allow_tables_to_appear_in_same_query!(
    devices,
    persons,
    enrollments,
    punch_logs,
    attendance_sessions,
    device_commands,
);
