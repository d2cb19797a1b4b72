//! Diesel table definitions for the PostgreSQL schema.
//!
//! Maintained by hand alongside the embedded migrations; the column sets,
//! nullability and defaults here are a compatibility contract with
//! existing data and queries.

diesel::table! {
    networks (number) {
        number -> Int8,
        name -> Varchar,
        tartiflette -> Bool,
        disco -> Bool,
        ashash -> Bool,
    }
}

diesel::table! {
    countries (code) {
        code -> Varchar,
        name -> Varchar,
        tartiflette -> Bool,
        disco -> Bool,
    }
}

diesel::table! {
    atlas_location (id) {
        id -> Int8,
        name -> Varchar,
        #[sql_name = "type"]
        location_type -> Varchar,
        af -> Int4,
    }
}

diesel::table! {
    delay (id) {
        id -> Int8,
        timebin -> Timestamptz,
        asn -> Int8,
        magnitude -> Float8,
    }
}

diesel::table! {
    forwarding (id) {
        id -> Int8,
        timebin -> Timestamptz,
        asn -> Int8,
        magnitude -> Float8,
    }
}

diesel::table! {
    hegemony (id) {
        id -> Int8,
        timebin -> Timestamptz,
        originasn -> Int8,
        asn -> Int8,
        hege -> Float8,
        af -> Int4,
    }
}

diesel::table! {
    hegemony_cone (id) {
        id -> Int8,
        timebin -> Timestamptz,
        asn -> Int8,
        conesize -> Int4,
        af -> Int4,
    }
}

diesel::table! {
    atlas_delay (id) {
        id -> Int8,
        timebin -> Timestamptz,
        startpoint -> Int8,
        endpoint -> Int8,
        median -> Float8,
        nbtracks -> Int4,
        nbprobes -> Int4,
        entropy -> Float8,
        hop -> Int4,
        nbrealrtts -> Int4,
    }
}

diesel::table! {
    delay_alarms (id) {
        id -> Int8,
        asn -> Int8,
        timebin -> Timestamptz,
        ip -> Varchar,
        link -> Varchar,
        medianrtt -> Float8,
        diffmedian -> Float8,
        deviation -> Float8,
        nbprobes -> Int4,
    }
}

diesel::table! {
    delay_alarms_msms (id) {
        id -> Int8,
        alarm -> Int8,
        msmid -> Int8,
        probeid -> Int4,
    }
}

diesel::table! {
    forwarding_alarms (id) {
        id -> Int8,
        asn -> Int8,
        timebin -> Timestamptz,
        ip -> Varchar,
        correlation -> Float8,
        responsibility -> Float8,
        pktdiff -> Float8,
        previoushop -> Varchar,
    }
}

diesel::table! {
    forwarding_alarms_msms (id) {
        id -> Int8,
        alarm -> Int8,
        msmid -> Int8,
        probeid -> Int4,
    }
}

diesel::table! {
    hegemony_alarms (id) {
        id -> Int8,
        timebin -> Timestamptz,
        originasn -> Int8,
        asn -> Int8,
        deviation -> Float8,
        af -> Int4,
    }
}

diesel::table! {
    atlas_delay_alarms (id) {
        id -> Int8,
        timebin -> Timestamptz,
        startpoint -> Int8,
        endpoint -> Int8,
        deviation -> Float8,
    }
}

diesel::table! {
    disco_events (id) {
        id -> Int8,
        mongoid -> Varchar,
        streamtype -> Varchar,
        streamname -> Varchar,
        starttime -> Timestamptz,
        endtime -> Timestamptz,
        avglevel -> Float8,
        nbdiscoprobes -> Int4,
        totalprobes -> Int4,
        ongoing -> Bool,
    }
}

diesel::table! {
    disco_probes (id) {
        id -> Int8,
        probe_id -> Int4,
        event -> Int8,
        starttime -> Timestamptz,
        endtime -> Timestamptz,
        level -> Float8,
        ipv4 -> Varchar,
        prefixv4 -> Varchar,
        lat -> Float8,
        lon -> Float8,
    }
}

diesel::table! {
    ihr_users (id) {
        id -> Int8,
        email -> Varchar,
        password -> Varchar,
        is_active -> Bool,
        is_staff -> Bool,
        is_superuser -> Bool,
    }
}

diesel::table! {
    user_capabilities (id) {
        id -> Int8,
        #[sql_name = "user"]
        user_id -> Int8,
        capability -> Varchar,
    }
}

diesel::table! {
    monitored_asn (id) {
        id -> Int8,
        #[sql_name = "user"]
        user_id -> Int8,
        asn -> Int8,
        notifylevel -> Int2,
    }
}

diesel::table! {
    email_change_requests (id) {
        id -> Int8,
        #[sql_name = "user"]
        user_id -> Int8,
        new_email -> Varchar,
        request_time -> Timestamptz,
    }
}

diesel::joinable!(delay -> networks (asn));
diesel::joinable!(forwarding -> networks (asn));
diesel::joinable!(hegemony_cone -> networks (asn));
diesel::joinable!(delay_alarms -> networks (asn));
diesel::joinable!(forwarding_alarms -> networks (asn));
diesel::joinable!(delay_alarms_msms -> delay_alarms (alarm));
diesel::joinable!(forwarding_alarms_msms -> forwarding_alarms (alarm));
diesel::joinable!(disco_probes -> disco_events (event));
diesel::joinable!(user_capabilities -> ihr_users (user_id));
diesel::joinable!(monitored_asn -> ihr_users (user_id));
diesel::joinable!(monitored_asn -> networks (asn));
diesel::joinable!(email_change_requests -> ihr_users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    networks,
    countries,
    atlas_location,
    delay,
    forwarding,
    hegemony,
    hegemony_cone,
    atlas_delay,
    delay_alarms,
    delay_alarms_msms,
    forwarding_alarms,
    forwarding_alarms_msms,
    hegemony_alarms,
    atlas_delay_alarms,
    disco_events,
    disco_probes,
    ihr_users,
    user_capabilities,
    monitored_asn,
    email_change_requests,
);
